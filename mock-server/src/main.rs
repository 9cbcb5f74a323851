use tokio::net::TcpListener;

#[tokio::main]
async fn main() -> Result<(), std::io::Error> {
    env_logger::Builder::from_env(env_logger::Env::default().default_filter_or("info")).init();

    let port = std::env::var("PORT").unwrap_or_else(|_| "1965".to_string());
    let addr = format!("127.0.0.1:{port}");
    let listener = TcpListener::bind(&addr).await?;
    log::info!("listening on gemini://{addr}/");
    mock_capsule::run(listener, mock_capsule::tls_acceptor()?).await
}
