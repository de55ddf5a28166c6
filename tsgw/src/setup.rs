use anyhow::Result;
use tsgw_config::Config;
use tsgw_statsd::MetricsConfig;

/// Rejects configurations the server cannot operate with.
pub fn check_config(config: &Config) -> Result<()> {
    if config.max_payload_size() == 0 {
        anyhow::bail!("`limits.max_payload_size` must be greater than 0");
    }

    if config.public_org_id() == Some(0) {
        anyhow::bail!("`ingest.public_org_id` must be a valid organization or -1 to disable");
    }

    if config.admin_key().is_none() && config.api_keys().is_empty() {
        tsgw_log::warn!("no api keys configured, only the index route will be usable");
    }

    Ok(())
}

/// Print spawn infos to the log.
pub fn dump_spawn_infos(config: &Config) {
    if config.path().as_os_str().is_empty() {
        tsgw_log::info!("launching gateway without config folder");
    } else {
        tsgw_log::info!(
            "launching gateway from config folder {}",
            config.path().display()
        );
    }
    tsgw_log::info!("  log level: {}", config.logging().level);

    match config.public_org_id() {
        Some(org_id) => tsgw_log::info!("  public org: {org_id}"),
        None => tsgw_log::info!("  public org: -"),
    }
    match config.publish_url() {
        Some(url) => tsgw_log::info!("  publish url: {url}"),
        None => tsgw_log::info!("  publish url: -"),
    }
    match config.search_url() {
        Some(url) => tsgw_log::info!("  search url: {url}"),
        None => tsgw_log::info!("  search url: -"),
    }
}

/// Initialize the metric system.
pub fn init_metrics(config: &Config) -> Result<()> {
    let Some(host) = config.statsd_addr() else {
        return Ok(());
    };

    let mut default_tags = config.metrics_default_tags().clone();
    if let Some(hostname_tag) = config.metrics_hostname_tag()
        && let Some(hostname) = hostname::get().ok().and_then(|s| s.into_string().ok())
    {
        default_tags.insert(hostname_tag.to_owned(), hostname);
    }

    tsgw_statsd::init(MetricsConfig {
        prefix: config.metrics_prefix().to_owned(),
        host: host.to_owned(),
        default_tags,
        sample_rate: config.metrics_sample_rate(),
    })?;

    Ok(())
}
