//! spout: the Customer service.
//!
//! ```text
//! spout --addr 0.0.0.0:3000 --body-log stdout
//! RUST_LOG=debug SPOUT_FACT_URL=http://facts.internal/fact spout
//! ```

use std::sync::Arc;

use clap::Parser;
use futures_util::TryStreamExt;
use tracing::info;

use spout::catfact::FactClient;
use spout::config::{BodyLogTarget, Config, init_tracing};
use spout::customer::{AppState, CustomerRepository, InMemoryCustomerRepository, routes};
use spout::middleware::{BodyLog, ChannelSink, Trace, TracingSink};
use spout::{Server, health};

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let config = Config::parse();
    init_tracing(config.log_format);

    let customers = InMemoryCustomerRepository::with_customers(["alice", "bob"]);
    report_customers(&customers).await?;

    let state = Arc::new(AppState {
        customers,
        facts: FactClient::new(&config.fact_url, config.fact_timeout())?,
    });

    let app = routes(state)
        .get("/healthz", health::liveness)
        .get("/readyz", health::readiness)
        .layer(Trace);

    let (app, body_writer) = match config.body_log {
        BodyLogTarget::Off => (app, None),
        BodyLogTarget::Tracing => {
            let (sink, writer) = TracingSink::spawn(config.body_log_capacity);
            (app.layer(BodyLog::new(sink)), Some(writer))
        }
        BodyLogTarget::Stdout => {
            let (sink, writer) = ChannelSink::spawn_writer(tokio::io::stdout(), config.body_log_capacity);
            (app.layer(BodyLog::new(sink)), Some(writer))
        }
    };

    info!(addr = %config.addr, body_log = ?config.body_log, "starting spout");
    Server::bind(config.addr).serve(app).await?;

    // The router, and every sink clone in it, is gone once `serve` returns,
    // so the writer finishes as soon as its queue is empty.
    if let Some(writer) = body_writer {
        writer.await?;
    }
    Ok(())
}

/// Logs every stored customer once at startup.
async fn report_customers<R: CustomerRepository>(repo: &R) -> anyhow::Result<()> {
    let mut all = repo.find_all();
    while let Some(customer) = all.try_next().await? {
        info!(id = ?customer.id, name = %customer.name, "customer");
    }
    info!("all customers printed");
    Ok(())
}
