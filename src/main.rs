use anyhow::Result;
use article_pipeline::utils::logging;
use article_pipeline::{App, Config};
use std::path::Path;

#[tokio::main]
async fn main() -> Result<()> {
    // 加载配置（config.toml 可选，环境变量优先）
    let config = Config::load(Some(Path::new("config.toml")))?;

    // 初始化日志
    logging::init(config.verbose_logging);

    // 初始化并运行应用
    App::initialize(config).await?.run().await?;

    Ok(())
}
