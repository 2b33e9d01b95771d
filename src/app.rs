use crate::config::{load_config, PipelineConfig};
use crate::logging::{LogLevel, LogRotationPolicy, PipelineLogger};
use crate::pipeline::EventPipeline;
use crate::quiescence::CollectingSectionSink;
use crate::sink::StoreSink;
use anyhow::Result;
use std::env;
use std::io::Read;
use std::time::{SystemTime, UNIX_EPOCH};

/// Application entrypoint: load configuration, bring the pipeline up, run
/// until stdin closes, then drain and report.
///
/// The fragment transport and the coordinator that seeds records live
/// outside this process; embedding applications construct
/// [`EventPipeline`] directly and drive [`EventPipeline::submit`]
/// themselves.
pub fn run() -> Result<()> {
    let config = match env::args().nth(1) {
        Some(path) => load_config(path)?,
        None => PipelineConfig::default(),
    };
    config.validate()?;

    let mut logger = PipelineLogger::new(config.run_id, LogRotationPolicy::default());
    logger.log(
        now_ms(),
        LogLevel::Info,
        "app",
        None,
        &format!(
            "starting pipeline: {} sources, pool {}, packing {}",
            config.expected_sources, config.resource_pool, config.packing
        ),
    )?;

    let section_sink = CollectingSectionSink::new();
    let store = StoreSink::new();
    let mut pipeline = EventPipeline::new(
        config,
        Box::new(section_sink.clone()),
        Box::new(crate::allocator::CollectingFlushSink::new()),
        Box::new(store.clone()),
    );
    pipeline.start();

    // Lifetime is bound to stdin: EOF means the operator wants a drain.
    let mut drain = Vec::new();
    let _ = std::io::stdin().read_to_end(&mut drain);

    let outcome = pipeline.stop();
    for section in section_sink.closed() {
        logger.log(now_ms(), LogLevel::Info, "app", Some(section), "section closed")?;
    }
    logger.log(
        now_ms(),
        LogLevel::Info,
        "app",
        None,
        &format!("stored {} records", store.len()),
    )?;
    print!("{}", pipeline.render_metrics());
    outcome?;
    Ok(())
}

fn now_ms() -> u64 {
    SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .map(|elapsed| elapsed.as_millis() as u64)
        .unwrap_or(0)
}
