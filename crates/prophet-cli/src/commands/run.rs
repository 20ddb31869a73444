use std::sync::Arc;

use tracing::{error, info};

use prophet_core::{
    sample_host, BrowserClient, BrowserSource, FallbackCollector, FastSource, HistoryStore,
    HttpBrowserClient, HttpClient, LinearModel, NoopBrowserClient, NoopHttpClient, NoopNotifier,
    Notifier, Pipeline, PredictionEngine, PriceSource, ReportBuilder, ReqwestHttpClient,
    ResourceGuard, ResourceThresholds, WebhookNotifier,
};

use crate::cli::RunArgs;
use crate::config::RunConfig;
use crate::error::CliError;

const MIB: u64 = 1024 * 1024;

pub async fn execute(args: &RunArgs) -> Result<(), CliError> {
    let mut config = RunConfig::load(&args.config)?;
    if let Some(db) = &args.db {
        config.db_path = Some(db.clone());
    }
    if let Some(model) = &args.model {
        config.model_path = model.clone();
    }

    let instruments = config.instruments()?;

    // Model load failure is fatal; nothing else starts without it.
    let model = LinearModel::load(&config.model_path).map_err(|err| {
        error!(path = %config.model_path.display(), %err, "model load failed, aborting run");
        err
    })?;

    let http_client: Arc<dyn HttpClient> = if args.offline {
        Arc::new(NoopHttpClient)
    } else {
        Arc::new(ReqwestHttpClient::new())
    };
    let browser_client: Arc<dyn BrowserClient> = if args.offline {
        Arc::new(NoopBrowserClient)
    } else {
        Arc::new(HttpBrowserClient::new())
    };

    let sources: Vec<Arc<dyn PriceSource>> = vec![
        Arc::new(FastSource::new(http_client.clone())),
        Arc::new(BrowserSource::new(browser_client)),
    ];

    let notifier: Arc<dyn Notifier> = match (&config.webhook_url, args.offline) {
        (Some(url), false) => Arc::new(WebhookNotifier::new(http_client.clone(), url)),
        _ => Arc::new(NoopNotifier),
    };

    let store = match &config.db_path {
        Some(path) => Some(HistoryStore::open(path)?),
        None => None,
    };

    let guard = ResourceGuard::new(ResourceThresholds {
        min_available_memory_bytes: config.min_available_memory_mb * MIB,
        ..ResourceThresholds::default()
    });

    let pipeline = Pipeline::new(
        guard,
        FallbackCollector::new(sources, config.lookback_days),
        PredictionEngine::new(Arc::new(model)),
        ReportBuilder::new(config.rank_depth),
        notifier,
        store,
    );

    let snapshot = sample_host();
    let summary = pipeline.run(&instruments, &snapshot).await?;

    println!("{}", summary.report.summary_text());
    if !summary.collection_failures.is_empty() {
        println!("Collection failures:");
        for failure in &summary.collection_failures {
            println!("  {failure}");
        }
    }
    if !summary.prediction_failures.is_empty() {
        println!("Prediction skips:");
        for failure in &summary.prediction_failures {
            println!("  {failure}");
        }
    }

    info!(
        predicted = summary.report.entries.len(),
        collected = summary.collected,
        "run complete"
    );
    Ok(())
}
