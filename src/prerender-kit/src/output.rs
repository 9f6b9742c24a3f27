//! Where prerendered responses land on disk.

use std::path::{Path, PathBuf};

use crate::errors::{Error, Result};

/// Which output directory a response is written to.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Category {
    /// Responses to crawled paths.
    Pages,
    /// Responses the renderer fetched internally while rendering a page.
    Dependencies,
}

impl Category {
    fn dir_name(self) -> &'static str {
        match self {
            Category::Pages => "pages",
            Category::Dependencies => "dependencies",
        }
    }
}

/// The output directory tree of one run.
#[derive(Debug, Clone)]
pub struct OutputDirs {
    root: PathBuf,
}

impl OutputDirs {
    pub fn new(out_dir: &Path) -> Self {
        OutputDirs {
            root: out_dir.join("output").join("prerendered"),
        }
    }

    pub fn dir(&self, category: Category) -> PathBuf {
        self.root.join(category.dir_name())
    }

    pub fn dest(&self, category: Category, file: &str) -> PathBuf {
        self.dir(category).join(file)
    }
}

/// The file (relative to a category directory) that the response for `path` is written to.
///
/// HTML is written as `<path>/index.html` unless the path already ends in `.html`.
pub fn output_filename(paths_base: &str, path: &str, is_html: bool) -> String {
    let file = path
        .get(paths_base.len() + 1..)
        .filter(|file| !file.is_empty())
        .unwrap_or("index.html");

    if is_html && !file.ends_with(".html") {
        if file.ends_with('/') {
            format!("{file}index.html")
        } else {
            format!("{file}/index.html")
        }
    } else {
        file.to_string()
    }
}

/// The page written in place of a redirect: a script for browsers with JavaScript and a
/// meta refresh for those without.
pub fn redirect_stub(location: &str) -> String {
    let script_location = serde_json::to_string(location)
        .unwrap_or_else(|_| "\"/\"".to_string())
        .replace('<', "\\u003C")
        .replace('\u{2028}', "\\u2028")
        .replace('\u{2029}', "\\u2029");
    format!(
        "<script>location.href={script_location};</script><meta http-equiv=\"refresh\" content=\"{}\">",
        escape_html_attr(&format!("0;url={location}"))
    )
}

fn escape_html_attr(value: &str) -> String {
    value.replace('&', "&amp;").replace('"', "&quot;")
}

/// Writes `body` to `dest`, creating parent directories.
///
/// Fails when `dest` is already a directory, or when its parent is already a file. `path` is
/// the decoded path being saved and only appears in error messages.
pub async fn write_output(dest: &Path, path: &str, body: &[u8]) -> Result<()> {
    if tokio::fs::metadata(dest).await.is_ok_and(|meta| meta.is_dir()) {
        return Err(Error::io(
            format!("Cannot save {path} as it is already a directory"),
            std::io::Error::new(std::io::ErrorKind::AlreadyExists, dest.display().to_string()),
        ));
    }

    if let Some(dir) = dest.parent() {
        if tokio::fs::metadata(dir).await.is_ok_and(|meta| !meta.is_dir()) {
            let parent = path.rsplit_once('/').map_or("", |(parent, _)| parent);
            return Err(Error::io(
                format!("Cannot save {path} as {parent} is already a file"),
                std::io::Error::new(std::io::ErrorKind::AlreadyExists, dir.display().to_string()),
            ));
        }
        tokio::fs::create_dir_all(dir)
            .await
            .map_err(|e| Error::io(format!("Cannot create {}", dir.display()), e))?;
    }

    tokio::fs::write(dest, body)
        .await
        .map_err(|e| Error::io(format!("Cannot write {}", dest.display()), e))
}

/// Every file under `dir`, relative to it and joined with `/`. Empty when `dir` doesn't exist.
pub async fn list_files(dir: &Path) -> Result<Vec<String>> {
    let mut files = Vec::new();
    if !tokio::fs::try_exists(dir).await.unwrap_or(false) {
        return Ok(files);
    }

    let mut pending = vec![(dir.to_path_buf(), String::new())];
    while let Some((current, prefix)) = pending.pop() {
        let mut entries = tokio::fs::read_dir(&current)
            .await
            .map_err(|e| Error::io(format!("Cannot read {}", current.display()), e))?;
        while let Some(entry) = entries
            .next_entry()
            .await
            .map_err(|e| Error::io(format!("Cannot read {}", current.display()), e))?
        {
            let name = format!("{prefix}{}", entry.file_name().to_string_lossy());
            let file_type = entry
                .file_type()
                .await
                .map_err(|e| Error::io(format!("Cannot stat {}", entry.path().display()), e))?;
            if file_type.is_dir() {
                pending.push((entry.path(), format!("{name}/")));
            } else {
                files.push(name);
            }
        }
    }

    files.sort();
    Ok(files)
}
