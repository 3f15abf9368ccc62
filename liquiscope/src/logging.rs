use tracing_subscriber::EnvFilter;

/// 安装 fmt subscriber：优先读取 `RUST_LOG`，否则使用 `liquiscope=info`。可重复调用。
pub fn init_logging() {
    let filter =
        EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("liquiscope=info"));
    let _ = tracing_subscriber::fmt().with_env_filter(filter).try_init();
}
