//! Drives a prerender run: renders every reachable path once, persists what comes back and
//! checks the result once the crawl is exhausted.

use std::collections::{BTreeMap, BTreeSet, HashMap, HashSet};
use std::path::PathBuf;
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};

use async_trait::async_trait;
use core_kit::{TaskQueue, is_root_relative, resolve};
use data_model_kit::{
    Asset, EntryMismatchDetails, HttpErrorDetails, MissingIdDetails, Page, PrerenderOption, PrerenderedSet,
    Redirect, ReferenceType, RenderRequest, RenderResponse, etag,
};

use crate::config::PrerenderOptions;
use crate::errors::{Error, Result};
use crate::output::{Category, OutputDirs, list_files, output_filename, redirect_stub, write_output};
use crate::render::{AssetReader, Renderer, RouteEntry};

/// Prerenders the application behind `renderer`.
///
/// Starts from `options.entries` and from every entry generated for `routes`, then follows
/// links in rendered HTML until nothing new turns up. Returns the summary of what was written.
pub async fn prerender(
    renderer: Arc<dyn Renderer>,
    routes: &[RouteEntry],
    options: PrerenderOptions,
) -> Result<PrerenderedSet> {
    options.validate()?;

    let mut files: HashSet<String> = options.client_files.iter().cloned().collect();
    if let Some(static_dir) = &options.static_dir {
        files.extend(list_files(static_dir).await?);
    }

    tracing::info!(
        "[prerender] Starting from {} entries and {} routes (concurrency: {}, crawl: {})",
        options.entries.len(),
        routes.len(),
        options.concurrency,
        options.crawl
    );

    let run = Arc::new(Run::new(renderer, routes, options, files));
    if let Err(err) = run.seed(routes) {
        // seeding stops when the queue closes on a task failure; report that failure instead
        if matches!(err, Error::Queue(_)) {
            run.queue.done().await?;
        }
        return Err(err);
    }
    run.queue.done().await?;

    run.check_hashlinks()?;
    run.check_prerendered()?;

    let prerendered = std::mem::take(&mut run.lock().prerendered);
    tracing::info!(
        "[prerender] Done: {} pages, {} assets, {} redirects",
        prerendered.page_count(),
        prerendered.asset_count(),
        prerendered.redirect_count()
    );
    Ok(prerendered)
}

/// Mutable bookkeeping of a run. Never held across an await.
#[derive(Default)]
struct RunState {
    /// Every path ever enqueued.
    seen: HashSet<String>,
    /// Output files claimed so far, per category-relative name. The first writer wins.
    written: HashSet<String>,
    /// Decoded path to the file its response was written to, for read-back.
    saved: HashMap<String, PathBuf>,
    prerendered: PrerenderedSet,
    /// `(path, id)` targets of fragment links, with the pages linking to them.
    expected_hashlinks: BTreeMap<(String, String), BTreeSet<String>>,
    /// Ids found on each crawled page.
    actual_hashlinks: HashMap<String, Vec<String>>,
    /// Prerender option of each known route.
    prerender_map: BTreeMap<String, PrerenderOption>,
}

struct Run {
    renderer: Arc<dyn Renderer>,
    options: PrerenderOptions,
    dirs: OutputDirs,
    /// Prebuilt client assets and static files, relative to the paths base.
    files: HashSet<String>,
    queue: TaskQueue<Error>,
    state: Mutex<RunState>,
}

impl Run {
    fn new(renderer: Arc<dyn Renderer>, routes: &[RouteEntry], options: PrerenderOptions, files: HashSet<String>) -> Self {
        let state = RunState {
            prerender_map: routes.iter().map(|route| (route.id.clone(), route.prerender)).collect(),
            ..RunState::default()
        };
        Run {
            renderer,
            dirs: OutputDirs::new(&options.out_dir),
            queue: TaskQueue::new(options.concurrency),
            options,
            files,
            state: Mutex::new(state),
        }
    }

    fn lock(&self) -> MutexGuard<'_, RunState> {
        self.state.lock().unwrap_or_else(PoisonError::into_inner)
    }

    /// Enqueues the configured entries, then every generated entry.
    fn seed(self: &Arc<Self>, routes: &[RouteEntry]) -> Result<()> {
        let base = self.options.paths_base.as_str();

        for entry in &self.options.entries {
            if entry == "*" {
                for route in routes.iter().filter(|route| route.is_prerenderable()) {
                    if let Some(path) = route.static_path() {
                        self.enqueue(None, format!("{base}{path}"), None)?;
                    }
                }
            } else {
                self.enqueue(None, format!("{base}{entry}"), None)?;
            }
        }

        for route in routes {
            for params in &route.entries {
                let path = core_kit::resolve_route(&route.id, params)?;
                self.enqueue(None, format!("{base}{path}"), Some(route.id.clone()))?;
            }
        }

        Ok(())
    }

    /// Queues a visit to `path` unless it was seen before or names a known file.
    fn enqueue(self: &Arc<Self>, referrer: Option<String>, path: String, generated_from_id: Option<String>) -> Result<()> {
        if !self.lock().seen.insert(path.clone()) {
            return Ok(());
        }

        let file = path.get(self.options.paths_base.len() + 1..).unwrap_or_default();
        if self.files.contains(file) {
            tracing::debug!("[prerender: {path}] Served as a file, not rendering");
            return Ok(());
        }

        let run = Arc::clone(self);
        self.queue
            .add(async move { run.visit(path, referrer, generated_from_id).await })?;
        Ok(())
    }

    async fn visit(self: Arc<Self>, path: String, referrer: Option<String>, generated_from_id: Option<String>) -> Result<()> {
        if !path.starts_with(self.options.paths_base.as_str()) {
            let details = HttpErrorDetails {
                status: 404,
                path,
                referrer,
                reference_type: ReferenceType::Linked,
            };
            return self.options.handle_http_error.handle(details, Error::HttpError);
        }

        tracing::debug!("[prerender: {path}] Rendering");
        let request = RenderRequest::get(&path).with_origin(&self.options.origin);
        let assets: &dyn AssetReader = &*self;
        let response = self
            .renderer
            .render(request, assets)
            .await
            .map_err(|cause| Error::Render {
                path: path.clone(),
                cause: Arc::new(cause),
            })?;
        tracing::debug!("[prerender: {path}] Rendered with status {}", response.status);

        if let (Some(generated_from_id), Some(matched_id)) = (&generated_from_id, &response.route_id) {
            if generated_from_id != matched_id {
                let details = EntryMismatchDetails {
                    generated_from_id: generated_from_id.clone(),
                    entry: path.clone(),
                    matched_id: matched_id.clone(),
                };
                self.options
                    .handle_entry_generator_mismatch
                    .handle(details, Error::EntryGeneratorMismatch)?;
            }
        }

        self.save(Category::Pages, &response, &path, referrer.as_deref(), ReferenceType::Linked)
            .await?;

        for (dependency_path, dependency) in &response.dependencies {
            self.record_route_prerender(dependency);
            let dependency_path = strip_query_and_fragment(dependency_path);
            self.save(
                Category::Dependencies,
                dependency,
                dependency_path,
                Some(&path),
                ReferenceType::Fetched,
            )
            .await?;
        }

        if self.options.crawl && response.is_success() && response.is_html() {
            self.follow_links(&path, &response)?;
        }

        Ok(())
    }

    /// Enqueues every site-relative link in a rendered page and records its fragment targets.
    fn follow_links(self: &Arc<Self>, path: &str, response: &RenderResponse) -> Result<()> {
        let found = core_kit::crawl(&response.body_text(), path);
        self.lock().actual_hashlinks.insert(path.to_string(), found.ids);

        for href in found.hrefs {
            if !is_root_relative(&href) {
                continue;
            }

            let (rest, fragment) = match href.split_once('#') {
                Some((rest, fragment)) => (rest, Some(fragment)),
                None => (href.as_str(), None),
            };
            let pathname = match rest.split_once('?') {
                Some((pathname, _)) => {
                    tracing::debug!("[prerender: {path}] Query string in {href} has no effect on prerendered output");
                    pathname
                }
                None => rest,
            };
            let pathname = decode_uri(pathname);

            if let Some(id) = fragment.filter(|fragment| !fragment.is_empty()) {
                self.lock()
                    .expected_hashlinks
                    .entry((pathname.clone(), decode_uri(id)))
                    .or_default()
                    .insert(path.to_string());
            }

            self.enqueue(Some(path.to_string()), pathname, None)?;
        }

        Ok(())
    }

    /// A dependency declaring `prerender` upgrades its route, unless the route is already `auto`.
    fn record_route_prerender(&self, dependency: &RenderResponse) {
        let (Some(route_id), Some(prerender)) = (&dependency.route_id, dependency.prerender) else {
            return;
        };
        if prerender == PrerenderOption::False {
            return;
        }

        let mut state = self.lock();
        if state.prerender_map.get(route_id) != Some(&PrerenderOption::Auto) {
            state.prerender_map.insert(route_id.clone(), prerender);
        }
    }

    /// Classifies one response and persists it: 2xx as a page or asset, 3xx as a redirect stub,
    /// anything else through the http error policy.
    async fn save(
        self: &Arc<Self>,
        category: Category,
        response: &RenderResponse,
        path: &str,
        referrer: Option<&str>,
        reference_type: ReferenceType,
    ) -> Result<()> {
        let is_html = response.is_redirect() || response.is_html();
        let file = output_filename(&self.options.paths_base, path, is_html);
        let already_written = self.lock().written.contains(&file);
        if already_written {
            return Ok(());
        }

        if response.is_success() || response.is_redirect() {
            if let Some(route_id) = &response.route_id {
                self.lock().prerendered.add_prerendered_route(route_id);
            }
        }

        if response.is_redirect() {
            return self.save_redirect(category, response, path, &file).await;
        }

        if !response.is_success() {
            let details = HttpErrorDetails {
                status: response.status,
                path: path.to_string(),
                referrer: referrer.map(str::to_string),
                reference_type,
            };
            return self.options.handle_http_error.handle(details, Error::HttpError);
        }

        if !self.claim(&file) {
            return Ok(());
        }
        let dest = self.dirs.dest(category, &file);
        write_output(&dest, path, &response.body).await?;

        {
            let etag = etag(&response.body);
            let mut state = self.lock();
            if is_html {
                state.prerendered.add_page(
                    path,
                    Page {
                        file: file.clone(),
                        etag,
                    },
                );
            } else {
                let content_type = response
                    .header("content-type")
                    .unwrap_or("application/octet-stream")
                    .to_string();
                state.prerendered.add_asset(path, Asset { content_type, etag });
            }
            state.saved.insert(path.to_string(), dest);
        }

        tracing::info!("[prerender: {path}] Saved {file}");
        Ok(())
    }

    async fn save_redirect(
        self: &Arc<Self>,
        category: Category,
        response: &RenderResponse,
        path: &str,
        file: &str,
    ) -> Result<()> {
        let Some(location) = response.location() else {
            tracing::warn!("[prerender: {path}] Location header missing on {} redirect", response.status);
            return Ok(());
        };

        let resolved = resolve(path, location).unwrap_or_else(|| location.to_string());
        if is_root_relative(&resolved) {
            let target = decode_uri(strip_query_and_fragment(&resolved));
            self.enqueue(Some(path.to_string()), target, None)?;
        }

        if response.normalized || !self.claim(file) {
            return Ok(());
        }

        tracing::warn!("[prerender: {path}] {} {path} -> {location}", response.status);
        write_output(&self.dirs.dest(category, file), path, redirect_stub(location).as_bytes()).await?;
        self.lock().prerendered.add_redirect(
            path,
            Redirect {
                status: response.status,
                location: resolved,
            },
        );
        Ok(())
    }

    /// Claims an output file. `false` when another response already claimed it.
    fn claim(&self, file: &str) -> bool {
        self.lock().written.insert(file.to_string())
    }

    /// Runs the missing id policy for every fragment link whose target page lacks the id.
    /// Targets that were never crawled are skipped.
    fn check_hashlinks(&self) -> Result<()> {
        let missing: Vec<MissingIdDetails> = {
            let state = self.lock();
            state
                .expected_hashlinks
                .iter()
                .filter_map(|((path, id), referrers)| {
                    let ids = state.actual_hashlinks.get(path)?;
                    (!ids.contains(id)).then(|| MissingIdDetails {
                        path: path.clone(),
                        id: id.clone(),
                        referrers: referrers.iter().cloned().collect(),
                    })
                })
                .collect()
        };

        for details in missing {
            self.options.handle_missing_id.handle(details, Error::MissingId)?;
        }
        Ok(())
    }

    /// Fails when a route marked `prerender = true` was never prerendered.
    fn check_prerendered(&self) -> Result<()> {
        let state = self.lock();
        let not_prerendered: Vec<String> = state
            .prerender_map
            .iter()
            .filter(|(id, prerender)| **prerender == PrerenderOption::True && !state.prerendered.is_route_prerendered(id))
            .map(|(id, _)| id.clone())
            .collect();

        if not_prerendered.is_empty() {
            Ok(())
        } else {
            Err(Error::NotPrerendered(not_prerendered))
        }
    }
}

#[async_trait]
impl AssetReader for Run {
    async fn read(&self, path: &str) -> Option<Vec<u8>> {
        let saved = self.lock().saved.get(path).cloned();
        if let Some(dest) = saved {
            return tokio::fs::read(dest).await.ok();
        }

        let static_dir = self.options.static_dir.as_ref()?;
        let file = path.strip_prefix(self.options.paths_base.as_str())?.trim_start_matches('/');
        if file.is_empty() || file.split('/').any(|segment| segment == "..") {
            return None;
        }
        tokio::fs::read(static_dir.join(file)).await.ok()
    }
}

/// Percent-decodes a pathname the way request paths are decoded, leaving it as-is when it
/// isn't valid UTF-8 once decoded.
fn decode_uri(pathname: &str) -> String {
    core_kit::routing::decode_pathname(pathname).unwrap_or_else(|_| pathname.to_string())
}

fn strip_query_and_fragment(href: &str) -> &str {
    href.split(|c: char| c == '?' || c == '#').next().unwrap_or(href)
}
