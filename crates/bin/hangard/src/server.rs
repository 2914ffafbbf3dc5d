use std::{future::Future, net::SocketAddr, sync::Arc};

use arrow_flight::flight_service_server::FlightServiceServer;
use common::{BoxResult, config::Config};
use server::Service;
use tokio::net::TcpListener;
use tokio_stream::wrappers::TcpListenerStream;
use tonic::transport::Server;

/// Binds the Flight listener and returns the bound address together with the
/// serve future. Binding eagerly lets callers use an ephemeral port.
pub async fn run(
    config: Arc<Config>,
) -> BoxResult<(SocketAddr, impl Future<Output = BoxResult<()>>)> {
    let service = Service::new(&config);

    let listener = TcpListener::bind(config.flight_addr).await?;
    let addr = listener.local_addr()?;

    let server = async move {
        Server::builder()
            .add_service(FlightServiceServer::new(service))
            .serve_with_incoming(TcpListenerStream::new(listener))
            .await?;
        Ok(())
    };

    Ok((addr, server))
}
