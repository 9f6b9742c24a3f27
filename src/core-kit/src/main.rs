use std::path::PathBuf;
use std::sync::Arc;

use clap::{Parser, Subcommand};
use core_kit::{Matchers, Router, crawl, setup_logging, sort_routes};
use regex::Regex;

#[derive(Parser)]
#[command(name = "kit")]
#[command(about = "One-off checks against route ids and rendered HTML", long_about = None)]
struct KitCli {
    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Print route ids most-specific-first, the order they are tried when matching.
    Sort {
        /// Route ids, e.g. /blog/[slug]
        #[arg(required = true)]
        routes: Vec<String>,
    },

    /// Find the route that handles a pathname and print it with its params as JSON.
    Match {
        /// The request pathname to resolve.
        #[arg(short, long)]
        path: String,
        /// A param matcher as name=regex, e.g. integer=^\d+$ (repeatable).
        #[arg(short, long = "matcher", value_parser = parse_matcher)]
        matchers: Vec<(String, Regex)>,
        /// Route ids to match against.
        #[arg(required = true)]
        routes: Vec<String>,
    },

    /// Print the ids and links found in an HTML file as JSON.
    Crawl {
        /// The HTML file to scan.
        #[arg(short, long, value_parser = validate_input_file)]
        file: PathBuf,
        /// The path the document was served from.
        #[arg(short, long, default_value = "/")]
        base: String,
    },
}

fn parse_matcher(s: &str) -> Result<(String, Regex), String> {
    let (name, pattern) = s
        .split_once('=')
        .ok_or_else(|| format!("Expected name=regex, got: {s}"))?;
    let regex = Regex::new(pattern).map_err(|e| format!("Invalid matcher regex for '{name}': {e}"))?;
    Ok((name.to_string(), regex))
}

fn validate_input_file(s: &str) -> Result<PathBuf, String> {
    let path = PathBuf::from(s);

    if !path.exists() {
        return Err(format!("Input path does not exist: {}", path.display()));
    }

    if !path.is_file() {
        return Err(format!("Input path is not a file: {}", path.display()));
    }

    Ok(path)
}

fn main() {
    let _ = dotenvy::dotenv();
    setup_logging("warn");

    let cli = KitCli::parse();

    match cli.command {
        Commands::Sort { mut routes } => {
            sort_routes(&mut routes);
            for route in routes {
                println!("{route}");
            }
        }

        Commands::Match {
            path,
            matchers,
            routes,
        } => {
            let matchers: Matchers = matchers
                .into_iter()
                .map(|(name, regex)| {
                    let matcher: core_kit::ParamMatcher = Arc::new(move |value: &str| regex.is_match(value));
                    (name, matcher)
                })
                .collect();

            let router = match Router::new(&routes, matchers) {
                Ok(router) => router,
                Err(e) => {
                    eprintln!("ERROR: {e}");
                    std::process::exit(1)
                }
            };

            match router.find(&path) {
                Ok(Some(found)) => print_json(&found),
                Ok(None) => {
                    eprintln!("No route matches {path}");
                    std::process::exit(1)
                }
                Err(e) => {
                    eprintln!("ERROR: {e}");
                    std::process::exit(1)
                }
            }
        }

        Commands::Crawl { file, base } => match std::fs::read_to_string(&file) {
            Ok(html) => print_json(&crawl(&html, &base)),
            Err(e) => {
                eprintln!("ERROR: Cannot read file ({file:?}) due to: {e:?}");
                std::process::exit(1)
            }
        },
    }
}

fn print_json<T: serde::Serialize>(value: &T) {
    match serde_json::to_string_pretty(value) {
        Ok(json) => println!("{json}"),
        Err(e) => {
            eprintln!("ERROR: Cannot serialize output: {e}");
            std::process::exit(1)
        }
    }
}
