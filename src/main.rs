use auth_service::configuration::get_configuration;
use auth_service::startup::{build_service, run};
use auth_service::telemetry::init_telemetry;
use std::net::TcpListener;

#[tokio::main]
async fn main() -> std::io::Result<()> {
    let configuration = match get_configuration() {
        Ok(config) => config,
        Err(e) => {
            eprintln!("Failed to read configuration: {}", e);
            return Err(std::io::Error::new(
                std::io::ErrorKind::InvalidInput,
                "Configuration error",
            ));
        }
    };

    init_telemetry(&configuration.application.log_level);
    tracing::info!("Configuration loaded successfully");

    let pool = configuration.database.pool();

    tracing::info!("Applying database migrations");
    sqlx::migrate!("./migrations").run(&pool).await.map_err(|e| {
        tracing::error!("Failed to migrate the database: {}", e);
        std::io::Error::new(std::io::ErrorKind::ConnectionRefused, "Database migration error")
    })?;

    let service = build_service(&configuration, pool).map_err(|e| {
        tracing::error!("Failed to build authentication service: {}", e);
        std::io::Error::new(std::io::ErrorKind::InvalidInput, "Configuration error")
    })?;

    let address = configuration.application.address();
    let listener = TcpListener::bind(&address)?;
    tracing::info!("Server listening on: {}", address);

    run(listener, service)?.await
}
