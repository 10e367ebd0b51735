use std::{net::TcpListener, sync::Arc};

use actix_web::web;
use env_logger::Env;
use fleet::{
    configuration::{get_configuration, BrowserBackend, SinkKind},
    services::{
        BatchOrchestrator, Collaborators, ContextLauncher, DroidLauncher, HttpLauncher,
        JsonFileSink, OpenaiClient, PersistenceSink, Sentinel, SerperClient, SheetsSink,
    },
    startup::run,
};

#[tokio::main]
async fn main() -> std::io::Result<()> {
    env_logger::Builder::from_env(Env::default().default_filter_or("info")).init();

    let configuration = get_configuration().expect("Failed to read configuration.");

    let address = format!(
        "{}:{}",
        configuration.application.host, configuration.application.port
    );
    let listener = TcpListener::bind(address)?;

    let browser = &configuration.browser;
    let launcher: Arc<dyn ContextLauncher> = match browser.backend {
        BrowserBackend::Webdriver => Arc::new(DroidLauncher::new(
            &browser.webdriver_url,
            browser.headless,
            browser.navigation_timeout(),
        )),
        BrowserBackend::Http => Arc::new(HttpLauncher::new(browser.navigation_timeout())),
    };

    let persistence = &configuration.persistence;
    let sink: Arc<dyn PersistenceSink> = match persistence.kind {
        SinkKind::Sheets => Arc::new(SheetsSink::new(
            &persistence.spreadsheet_id,
            &configuration.api_keys.google_sheets,
        )),
        SinkKind::JsonFile => Arc::new(JsonFileSink::new(&persistence.output_dir)),
    };

    let sentinel = Sentinel::new(configuration.pipeline.probe_timeout())
        .expect("Failed to build the reachability client.");

    let collaborators = Collaborators {
        search: Arc::new(SerperClient::new(configuration.api_keys.serper.clone())),
        llm: Arc::new(OpenaiClient::new(
            configuration.api_keys.openai.clone(),
            &configuration.pipeline.model,
        )),
        probe: Arc::new(sentinel),
        sink,
        launcher,
    };
    let orchestrator = web::Data::new(BatchOrchestrator::new(
        configuration.pipeline.clone(),
        browser.pool_width,
        collaborators,
    ));

    log::info!(
        "Listening on {}:{}",
        configuration.application.host,
        configuration.application.port
    );
    run(listener, orchestrator, configuration.persistence.clone())?.await
}
