use std::process;
use std::sync::Arc;

use clap::{CommandFactory, Parser};
use tokio_util::sync::CancellationToken;
use tracing_subscriber::filter::LevelFilter;
use tracing_subscriber::fmt;
use uuid::Uuid;

use slugline_app::cli::{Cli, Commands, StatusArgs, SubmitArgs, WorkerArgs};
use slugline_app::config;
use slugline_app::error::AppError;
use slugline_app::model::JobRecord;
use slugline_app::object_store::ObjectStore as _;
use slugline_app::store::{JobStore as _, SceneStore as _};
use slugline_app::stream::{
    append_message, ChunkRequest, GROUP_ANALYSIS_WORKERS, GROUP_CHUNK_WORKERS,
    STREAM_PDF_CHUNKS, STREAM_SCENE_ANALYSIS,
};
use slugline_app::worker::context::build_pipeline_context;
use slugline_app::worker::{AnalysisHandler, ChunkingHandler, StageRunner};

#[tokio::main]
async fn main() {
    let cli = Cli::parse();
    init_tracing(log_level(cli.verbose));

    if let Err(err) = run(cli).await {
        eprintln!("{err}");
        process::exit(1);
    }
}

fn log_level(verbose: u8) -> LevelFilter {
    match verbose {
        0 => LevelFilter::INFO,
        1 => LevelFilter::DEBUG,
        _ => LevelFilter::TRACE,
    }
}

fn init_tracing(level: LevelFilter) {
    let subscriber = fmt().with_max_level(level).with_target(false).finish();
    if tracing::subscriber::set_global_default(subscriber).is_err() {
        tracing::warn!("tracing subscriber already set; skipping re-initialization");
    }
}

async fn run(cli: Cli) -> Result<(), AppError> {
    match cli.command {
        Some(Commands::Worker(args)) => run_worker(args).await,
        Some(Commands::Submit(args)) => run_submit(args).await,
        Some(Commands::Status(args)) => run_status(args).await,
        None => {
            Cli::command().print_help().map_err(|source| AppError::Io {
                path: std::path::PathBuf::from("<stdout>"),
                source,
            })?;
            Ok(())
        }
    }
}

async fn run_worker(args: WorkerArgs) -> Result<(), AppError> {
    let config = config::load()?;
    let ctx = build_pipeline_context(&config).await?;

    let consumer = args
        .consumer_id
        .unwrap_or_else(|| format!("{}-{}", config.worker.consumer_prefix, process::id()));
    tracing::info!(consumer = %consumer, "starting stage workers");

    let shutdown = CancellationToken::new();
    let chunking = {
        let runner = StageRunner::new(STREAM_PDF_CHUNKS, GROUP_CHUNK_WORKERS, consumer.clone());
        let stream = Arc::clone(&ctx.stream);
        let handler = ChunkingHandler::new(Arc::clone(&ctx));
        let shutdown = shutdown.clone();
        tokio::spawn(async move { runner.run(stream, handler, shutdown).await })
    };
    let analysis = {
        let runner = StageRunner::new(STREAM_SCENE_ANALYSIS, GROUP_ANALYSIS_WORKERS, consumer);
        let stream = Arc::clone(&ctx.stream);
        let handler = AnalysisHandler::new(Arc::clone(&ctx));
        let shutdown = shutdown.clone();
        tokio::spawn(async move { runner.run(stream, handler, shutdown).await })
    };

    if tokio::signal::ctrl_c().await.is_ok() {
        tracing::info!("shutdown signal received; letting in-flight work finish");
    }
    shutdown.cancel();

    for task in [chunking, analysis] {
        match task.await {
            Ok(result) => result?,
            Err(err) => tracing::error!(error = %err, "stage worker task panicked"),
        }
    }
    tracing::info!("workers stopped");
    Ok(())
}

async fn run_submit(args: SubmitArgs) -> Result<(), AppError> {
    let config = config::load()?;
    let ctx = build_pipeline_context(&config).await?;

    let bytes = tokio::fs::read(&args.path)
        .await
        .map_err(|source| AppError::Io {
            path: args.path.clone(),
            source,
        })?;

    let job_id = Uuid::new_v4().to_string();
    let source_ref = format!("scripts/{job_id}");
    ctx.objects.put(&source_ref, &bytes).await?;

    let job = JobRecord::new(job_id.clone(), source_ref.clone());
    ctx.jobs.insert(&job).await?;
    append_message(
        ctx.stream.as_ref(),
        STREAM_PDF_CHUNKS,
        &ChunkRequest { job_id: job_id.clone(), source_ref },
    )
    .await?;

    tracing::info!(job_id = %job_id, path = %args.path.display(), "submitted script");
    println!("{job_id}");
    Ok(())
}

async fn run_status(args: StatusArgs) -> Result<(), AppError> {
    let config = config::load()?;
    let ctx = build_pipeline_context(&config).await?;

    let job = ctx
        .jobs
        .find(&args.job_id)
        .await?
        .ok_or_else(|| AppError::JobNotFound(args.job_id.clone()))?;

    println!("job\t{}", job.job_id);
    println!("status\t{}", job.status.as_ref());
    println!(
        "scenes\t{}/{}",
        job.processed_scenes,
        job.scene_count
            .map(|count| count.to_string())
            .unwrap_or_else(|| "?".to_string())
    );
    if let Some(error) = &job.error_message {
        println!("error\t{error}");
    }

    let scenes = ctx.scenes.list_for_job(&args.job_id).await?;
    if !scenes.is_empty() {
        println!();
        println!("seq\tstatus\theader");
        for scene in scenes {
            println!(
                "{}\t{}\t{}",
                scene.sequence_number,
                scene.status.as_ref(),
                scene.header
            );
        }
    }
    Ok(())
}
