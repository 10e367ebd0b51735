use std::net::TcpListener;

use actix_web::{
    dev::Server,
    middleware::Logger,
    web::{self, Data},
    App, HttpServer,
};

use crate::{
    configuration::PersistenceSettings,
    routes::{default_route, upfitter_route},
    services::BatchOrchestrator,
};

pub fn run(
    listener: TcpListener,
    orchestrator: Data<BatchOrchestrator>,
    persistence: PersistenceSettings,
) -> Result<Server, std::io::Error> {
    let persistence = web::Data::new(persistence);

    let server = HttpServer::new(move || {
        App::new()
            .wrap(Logger::default())
            .service(default_route::default)
            .service(
                web::scope("/api/automation")
                    .service(upfitter_route::find_upfitters)
                    .service(upfitter_route::generate_info_for_cities),
            )
            .app_data(orchestrator.clone())
            .app_data(persistence.clone())
    })
    .listen(listener)?
    .run();

    Ok(server)
}
