use anyhow::Result;
use solar_leads::utils::logging::init_tracing;
use solar_leads::{App, RunConfig};

#[tokio::main]
async fn main() -> Result<()> {
    // 加载配置
    let config = RunConfig::from_env()?;

    // 初始化日志
    init_tracing(config.verbose_logging);

    // 初始化并运行应用
    App::initialize(config).await?.run().await?;

    Ok(())
}
