//! Arrow Flight protocol adapter.
//!
//! Maps the Flight surface onto repository operations: `list_flights` is
//! catalog enumeration, `get_flight_info` is descriptor construction,
//! `do_get`/`do_put` are the two directions of the transfer engine, and
//! `do_action`/`list_actions` cover administrative actions.

use std::pin::Pin;

use arrow_flight::{
    Action as FlightAction, ActionType, Criteria, Empty, FlightData, FlightDescriptor,
    FlightEndpoint, FlightInfo, HandshakeRequest, HandshakeResponse, PollInfo, PutResult,
    SchemaResult, Ticket,
    decode::FlightRecordBatchStream,
    encode::FlightDataEncoderBuilder,
    error::FlightError,
    flight_service_server::FlightService,
};
use bytes::{BufMut as _, Bytes, BytesMut};
use common::{
    Error as CoreError, actions::Action, descriptor::DatasetDescriptor, transfer::PushReceipt,
};
use futures::{Stream, StreamExt as _, TryStreamExt as _, stream};
use thiserror::Error;
use tonic::{Request, Response, Status, Streaming};
use tracing::instrument;

use crate::Service;

type TonicStream<T> = Pin<Box<dyn Stream<Item = Result<T, Status>> + Send + 'static>>;

#[derive(Debug, Error)]
pub enum Error {
    #[error(transparent)]
    Repository(#[from] CoreError),

    #[error("flight descriptor carries no path")]
    MissingPath,

    #[error("request payload is not valid UTF-8")]
    NonUtf8Payload,

    #[error("upload stream carries no schema")]
    MissingSchema,

    #[error("upload decode error: {0}")]
    Decode(#[source] FlightError),
}

impl From<Error> for Status {
    fn from(e: Error) -> Self {
        let message = e.to_string();
        match e {
            Error::Repository(err) => match err {
                CoreError::MalformedIdentifier(_) => Status::invalid_argument(message),
                CoreError::DatasetNotFound(_) | CoreError::SchemaUnavailable(_) => {
                    Status::not_found(message)
                }
                CoreError::UnsupportedTarget(_) => Status::invalid_argument(message),
                CoreError::UnsupportedAction(_) => Status::unimplemented(message),
                CoreError::Conflict(_) => Status::already_exists(message),
                CoreError::Io(_) | CoreError::Parquet(_) | CoreError::Arrow(_) => {
                    Status::internal(message)
                }
            },
            Error::MissingPath | Error::NonUtf8Payload | Error::MissingSchema => {
                Status::invalid_argument(message)
            }
            Error::Decode(_) => Status::invalid_argument(message),
        }
    }
}

impl Service {
    #[instrument(skip(self))]
    async fn list_flights(&self, criteria: &str) -> Result<TonicStream<FlightInfo>, Error> {
        let descriptors = self.repository().list(criteria).await?;
        Ok(descriptors
            .map_ok(make_flight_info)
            .map_err(|err| Status::from(Error::from(err)))
            .boxed())
    }

    #[instrument(skip(self))]
    async fn get_flight_info(&self, descriptor: FlightDescriptor) -> Result<FlightInfo, Error> {
        let name = descriptor_path(&descriptor)?;
        let resolved = self.repository().resolve(&name).await?;
        let described = self.repository().describe(&name, &resolved).await?;
        Ok(make_flight_info(described))
    }

    #[instrument(skip(self))]
    async fn do_get(&self, ticket: Ticket) -> Result<TonicStream<FlightData>, Error> {
        let name = utf8(&ticket.ticket)?.to_string();
        let resolved = self.repository().resolve(&name).await?;
        let stream = self.repository().pull(&name, resolved).await?;

        Ok(FlightDataEncoderBuilder::new()
            .with_schema(stream.schema.clone())
            .build(
                stream
                    .batches
                    .map_err(Error::Repository)
                    .map_err(Status::from)
                    .err_into(),
            )
            .map_err(Status::from)
            .boxed())
    }

    /// Consumes an upload: the first message names the destination via its
    /// flight descriptor, the IPC schema message establishes the schema, and
    /// every decoded batch is handed to the transfer engine as it arrives.
    async fn accept_upload<S>(&self, mut flight_data: S) -> Result<(String, PushReceipt), Error>
    where
        S: Stream<Item = Result<FlightData, FlightError>> + Send + Unpin + 'static,
    {
        let first = flight_data
            .next()
            .await
            .transpose()
            .map_err(Error::Decode)?
            .ok_or(Error::MissingSchema)?;
        let descriptor = first.flight_descriptor.clone().ok_or(Error::MissingPath)?;
        let name = descriptor_path(&descriptor)?;

        let mut batches = FlightRecordBatchStream::new_from_flight_data(
            stream::once(async move { Ok(first) }).chain(flight_data),
        );

        // Drive the decoder one step so the schema message is consumed even
        // when the upload carries no data batches.
        let head = batches.try_next().await.map_err(Error::Decode)?;
        let schema = batches.schema().cloned().ok_or(Error::MissingSchema)?;

        let batches = stream::iter(head.map(Ok))
            .chain(batches.map_err(|err| CoreError::Io(std::io::Error::other(err))))
            .boxed();

        let receipt = self.repository().push(&name, schema, batches).await?;
        tracing::info!(rows = receipt.rows, bytes = receipt.bytes, "accepted upload '{name}'");
        Ok((name, receipt))
    }

    #[instrument(skip(self))]
    async fn do_action(&self, action: FlightAction) -> Result<(), Error> {
        let action_kind: Action = action.r#type.parse().map_err(Error::Repository)?;
        let payload = utf8(&action.body)?.to_string();
        self.repository().act(action_kind, &payload).await?;
        Ok(())
    }
}

#[async_trait::async_trait]
impl FlightService for Service {
    type HandshakeStream = TonicStream<HandshakeResponse>;
    type ListFlightsStream = TonicStream<FlightInfo>;
    type DoGetStream = TonicStream<FlightData>;
    type DoPutStream = TonicStream<PutResult>;
    type DoActionStream = TonicStream<arrow_flight::Result>;
    type ListActionsStream = TonicStream<ActionType>;
    type DoExchangeStream = TonicStream<FlightData>;

    async fn handshake(
        &self,
        _request: Request<Streaming<HandshakeRequest>>,
    ) -> Result<Response<Self::HandshakeStream>, Status> {
        Err(Status::unimplemented("handshake"))
    }

    async fn list_flights(
        &self,
        request: Request<Criteria>,
    ) -> Result<Response<Self::ListFlightsStream>, Status> {
        let criteria = request.into_inner();
        let pattern = utf8(&criteria.expression)?.to_string();
        let stream = self.list_flights(&pattern).await?;
        Ok(Response::new(stream))
    }

    async fn get_flight_info(
        &self,
        request: Request<FlightDescriptor>,
    ) -> Result<Response<FlightInfo>, Status> {
        let descriptor = request.into_inner();
        let info = self.get_flight_info(descriptor).await?;
        Ok(Response::new(info))
    }

    async fn poll_flight_info(
        &self,
        _request: Request<FlightDescriptor>,
    ) -> Result<Response<PollInfo>, Status> {
        Err(Status::unimplemented("poll_flight_info"))
    }

    async fn get_schema(
        &self,
        _request: Request<FlightDescriptor>,
    ) -> Result<Response<SchemaResult>, Status> {
        Err(Status::unimplemented("get_schema"))
    }

    async fn do_get(&self, request: Request<Ticket>) -> Result<Response<Self::DoGetStream>, Status> {
        let ticket = request.into_inner();
        let data_stream = self.do_get(ticket).await?;
        Ok(Response::new(data_stream))
    }

    async fn do_put(
        &self,
        request: Request<Streaming<FlightData>>,
    ) -> Result<Response<Self::DoPutStream>, Status> {
        let flight_data = request.into_inner().map_err(FlightError::from);
        self.accept_upload(flight_data).await?;
        Ok(Response::new(
            stream::once(async { Ok(PutResult::default()) }).boxed(),
        ))
    }

    async fn do_exchange(
        &self,
        _request: Request<Streaming<FlightData>>,
    ) -> Result<Response<Self::DoExchangeStream>, Status> {
        Err(Status::unimplemented("do_exchange"))
    }

    async fn do_action(
        &self,
        request: Request<FlightAction>,
    ) -> Result<Response<Self::DoActionStream>, Status> {
        let action = request.into_inner();
        self.do_action(action).await?;
        Ok(Response::new(
            stream::once(async { Ok(arrow_flight::Result::default()) }).boxed(),
        ))
    }

    async fn list_actions(
        &self,
        _request: Request<Empty>,
    ) -> Result<Response<Self::ListActionsStream>, Status> {
        Ok(Response::new(
            stream::iter(action_types().into_iter().map(Ok)).boxed(),
        ))
    }
}

/// The static capability listing.
fn action_types() -> Vec<ActionType> {
    Action::ALL
        .iter()
        .map(|action| ActionType {
            r#type: action.name().to_string(),
            description: action.description().to_string(),
        })
        .collect()
}

/// Builds the protocol-level descriptor for one dataset. Unknown cardinality
/// and unknown byte size map to the Flight `-1` sentinel.
fn make_flight_info(descriptor: DatasetDescriptor) -> FlightInfo {
    let DatasetDescriptor {
        name,
        schema,
        total_records,
        total_bytes,
    } = descriptor;

    let endpoint = FlightEndpoint {
        ticket: Some(Ticket::new(name.clone())),

        // An empty location list means the ticket is only redeemable on the
        // service that produced it, per the Flight format docs.
        location: vec![],

        expiration_time: None,
        app_metadata: Bytes::new(),
    };

    FlightInfo {
        flight_descriptor: Some(FlightDescriptor::new_path(vec![name])),
        schema: ipc_schema(&schema),
        endpoint: vec![endpoint],
        ordered: false,
        total_records: total_records.unwrap_or(-1),
        total_bytes: total_bytes.map(|bytes| bytes as i64).unwrap_or(-1),
        app_metadata: Bytes::new(),
    }
}

fn descriptor_path(descriptor: &FlightDescriptor) -> Result<String, Error> {
    descriptor.path.first().cloned().ok_or(Error::MissingPath)
}

fn utf8(bytes: &Bytes) -> Result<&str, Error> {
    std::str::from_utf8(bytes).map_err(|_| Error::NonUtf8Payload)
}

fn ipc_schema(schema: &arrow::datatypes::Schema) -> Bytes {
    use arrow::ipc::writer::{DictionaryTracker, IpcDataGenerator};

    let ipc_opts = &Default::default();
    let mut dictionary_tracker = DictionaryTracker::new(true);
    let encoded = IpcDataGenerator::default().schema_to_bytes_with_dictionary_tracker(
        schema,
        &mut dictionary_tracker,
        ipc_opts,
    );

    // Unwrap: writing to `BytesMut` never fails.
    let mut bytes = BytesMut::new().writer();
    arrow::ipc::writer::write_message(&mut bytes, encoded, ipc_opts).unwrap();
    bytes.into_inner().into()
}
