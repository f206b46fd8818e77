use std::{path::PathBuf, sync::Arc};

use anyhow::{Context, anyhow};
use clap::{Parser, Subcommand};
use gallery_ingest::{
    config::Config,
    deploy::{Catalog, Storage},
    job::Orchestrator,
    metadata::FfmpegDecoder,
    progress::{ProgressReporter, create_reporter},
    record::{AlbumId, FileId, RawFile, UploadContext},
};
use tracing::error;

#[derive(Parser)]
struct Opts {
    #[clap(short, long, env = "GALLERY_INGEST_CONFIG")]
    config: PathBuf,
    #[clap(subcommand)]
    command: Command,
}

#[derive(clap::Args)]
struct Target {
    /// Album to work in
    #[clap(long, conflicts_with = "route")]
    album: Option<AlbumId>,
    /// Navigation path to resolve the album from, e.g. `/albums/12`
    #[clap(long)]
    route: Option<String>,
}

impl Target {
    fn context(&self) -> UploadContext {
        match (&self.album, &self.route) {
            (Some(album), _) => UploadContext::Album(*album),
            (None, Some(route)) => UploadContext::from_route(route.split('/')),
            (None, None) => UploadContext::Personal,
        }
    }
}

#[derive(Subcommand)]
enum Command {
    /// Upload files into the personal gallery or an album
    Upload {
        #[clap(flatten)]
        target: Target,
        #[clap(required = true)]
        files: Vec<PathBuf>,
    },
    /// List the files of the personal gallery or an album
    List {
        #[clap(flatten)]
        target: Target,
    },
    /// Remove a file from the catalog
    Remove { id: FileId },
}

type Gallery = Orchestrator<Catalog, Storage, FfmpegDecoder>;

async fn gallery(
    config: &Config,
    context: UploadContext,
    reporter: Arc<dyn ProgressReporter>,
) -> anyhow::Result<Gallery> {
    let catalog = config.catalog().await.with_context(|| "open catalog")?;
    let storage = config.storage().await.with_context(|| "open storage")?;
    Ok(Orchestrator::new(
        catalog,
        storage,
        config.pipeline.decoder(),
        config.session.user,
        context,
    )
    .with_preview_wait(config.pipeline.preview_wait())
    .with_reporter(reporter))
}

fn print_records(gallery: &Gallery) -> anyhow::Result<()> {
    for record in gallery.snapshot().records.iter() {
        println!(
            "{}",
            serde_json::to_string(record).with_context(|| "serialize record")?
        );
    }
    Ok(())
}

async fn run(opts: Opts) -> anyhow::Result<()> {
    let config = tokio::fs::read_to_string(&opts.config)
        .await
        .with_context(|| "read config")?;
    let config: Config = serde_yaml::from_str(&config)
        .with_context(|| format!("parse config from {}", opts.config.display()))?;
    let reporter = create_reporter();

    match opts.command {
        Command::Upload { target, files } => {
            let mut raw = Vec::with_capacity(files.len());
            for path in &files {
                raw.push(
                    RawFile::load(path)
                        .await
                        .with_context(|| format!("read {}", path.display()))?,
                );
            }
            let gallery = gallery(&config, target.context(), reporter.clone()).await?;
            let outcome = gallery.submit(raw).await;
            reporter.finish();
            print_records(&gallery)?;
            if !outcome.failures.is_empty() {
                for failure in &outcome.failures {
                    eprintln!("{failure}");
                }
                return Err(anyhow!(
                    "{} of {} files failed",
                    outcome.failures.len(),
                    files.len()
                ));
            }
        }
        Command::List { target } => {
            let gallery = gallery(&config, target.context(), reporter.clone()).await?;
            let fetched = gallery.fetch_context().await;
            reporter.finish();
            fetched?;
            print_records(&gallery)?;
        }
        Command::Remove { id } => {
            let gallery = gallery(&config, UploadContext::Personal, reporter.clone()).await?;
            let removed = gallery.remove(id).await;
            reporter.finish();
            removed?;
        }
    }
    Ok(())
}

fn main() {
    let opts = Opts::parse();
    tracing_subscriber::fmt()
        .with_env_filter(tracing_subscriber::EnvFilter::from_default_env())
        .with_writer(std::io::stderr)
        .init();
    let runtime = match tokio::runtime::Builder::new_current_thread()
        .enable_all()
        .build()
    {
        Ok(runtime) => runtime,
        Err(e) => {
            error!(?e, "failed to start runtime");
            std::process::exit(1);
        }
    };
    if let Err(e) = runtime.block_on(run(opts)) {
        error!(?e, "critical error");
        std::process::exit(1);
    }
}
