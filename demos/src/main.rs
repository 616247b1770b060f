use cassandra_cql::{Config, Connection, Consistency};

#[tokio::main]
async fn main() -> cassandra_cql::Result<()> {
    dotenvy::dotenv().ok();
    tracing_subscriber::fmt::init();

    let config = Config::from_env();
    let conn = Connection::connect(config).await?;

    let result = conn
        .query("SELECT id, name FROM users", Consistency::One)
        .await?;

    for i in 0..result.row_count().unwrap_or(0) {
        let row = result.row(i).unwrap();
        tracing::info!(?row, "fetched row");
    }

    Ok(())
}
