use std::sync::Arc;

use anyhow::{bail, Context};
use clap::Parser;
use tracing_subscriber::EnvFilter;

mod builder;
mod cli;
mod config;
mod errors;
mod semantic;
mod tags;
#[cfg(test)]
mod tests;
mod web;
use cli::PageArgs;
use config::Config;
use semantic::{
    check_dimensions, ClipEncoder, EmbeddingStore, Page, PageRequest, QueryEncoder, SearchService,
    SidecarCaptioner,
};
use tags::TagCatalog;

fn main() -> anyhow::Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")),
        )
        .init();

    let args = cli::Args::parse();
    let config = Config::load()?;

    match args.command {
        cli::Command::Serve { listen } => {
            let addr = match listen {
                Some(listen) => listen
                    .parse()
                    .with_context(|| format!("invalid listen address '{listen}'"))?,
                None => config.listen_addr()?,
            };

            let encoder = ClipEncoder::new(&config.encoder.model, config.base_path())?;
            if config.encoder.preload {
                if let Err(err) = encoder.preload_text() {
                    log::warn!("text model not loaded, will retry on first search: {err}");
                }
            }

            let store = open_store(&config, &encoder)?;
            log::info!(
                "loaded {} styles ({} dimensions)",
                store.len(),
                store.dimensions()
            );

            let state = web::ServerState {
                service: Arc::new(SearchService::new(Arc::new(store), Arc::new(encoder))),
                tags: Arc::new(TagCatalog::load(&config.tags_path())),
                index_path: config.index_path(),
                default_page_size: config.default_page_size,
                max_page_size: config.max_page_size,
            };

            web::start_daemon(state, config.thumbnails_dir(), addr)
        }

        cli::Command::Search { query, page } => {
            let service = open_service(&config)?;
            let found = service.search_by_text(&query.join(" "))?;
            let page = paginate(&config, found.results, &page);

            print_json(&web::SearchResponse::new(found.query, page))
        }

        cli::Command::Similar { code, page } => {
            let service = open_service(&config)?;
            let found = service.search_by_code(&code)?;
            let page = paginate(&config, found.results, &page);

            print_json(&web::SimilarResponse::new(found.reference, page))
        }

        cli::Command::Image { path, page } => {
            if !path.is_file() {
                bail!("{} is not a file", path.display());
            }
            let service = open_service(&config)?;
            let results = service.search_by_image(&path)?;
            let page = paginate(&config, results, &page);

            print_json(&web::SearchResponse::new(path.display().to_string(), page))
        }

        cli::Command::Tags { sample } => {
            let catalog = TagCatalog::load(&config.tags_path());
            match sample {
                Some(n) => print_json(&catalog.sample(n)),
                None => print_json(&web::TagsResponse::from(&catalog)),
            }
        }

        cli::Command::Build { no_progress } => {
            let encoder = ClipEncoder::new(&config.encoder.model, config.base_path())?;
            let captioner = SidecarCaptioner::new(config.captions_dir());
            let store = builder::build_index(
                &encoder,
                Some(&captioner),
                &config.metadata_path(),
                &config.images_dir(),
                !no_progress,
            )?;

            let index_path = config.index_path();
            if let Some(parent) = index_path.parent() {
                std::fs::create_dir_all(parent)?;
            }
            store.save(&index_path)?;

            println!("{} styles written to {}", store.len(), index_path.display());
            Ok(())
        }
    }
}

/// Load the index for `serve`. A missing, malformed or incompatible index is
/// fatal unless `degraded_start` is set, in which case an empty store is served.
fn open_store(config: &Config, encoder: &dyn QueryEncoder) -> anyhow::Result<EmbeddingStore> {
    let index_path = config.index_path();
    let checked = EmbeddingStore::load(&index_path)
        .map_err(anyhow::Error::from)
        .and_then(|store| {
            check_dimensions(&store, encoder)?;
            Ok(store)
        });

    match checked {
        Ok(store) => Ok(store),
        Err(err) if config.degraded_start => {
            log::error!(
                "failed to load {}: {err}; serving an empty index",
                index_path.display()
            );
            Ok(EmbeddingStore::empty())
        }
        Err(err) => Err(err.context(format!("failed to load {}", index_path.display()))),
    }
}

/// Store plus a lazily loaded encoder. Nothing is downloaded unless a query needs it.
fn open_service(config: &Config) -> anyhow::Result<SearchService> {
    let index_path = config.index_path();
    let store = EmbeddingStore::load(&index_path)
        .with_context(|| format!("failed to load {}", index_path.display()))?;
    let encoder = ClipEncoder::new(&config.encoder.model, config.base_path())?;

    Ok(SearchService::new(Arc::new(store), Arc::new(encoder)))
}

fn paginate<T>(config: &Config, items: Vec<T>, args: &PageArgs) -> Page<T> {
    let limit = PageRequest::new(args.offset, args.limit.unwrap_or(0))
        .effective_limit(config.default_page_size, config.max_page_size);
    Page::slice(items, args.offset, limit)
}

fn print_json<T: serde::Serialize>(value: &T) -> anyhow::Result<()> {
    println!("{}", serde_json::to_string_pretty(value)?);
    Ok(())
}
