//! Gateway module
//!
//! Generic entity operations over the CRM API, in OData or REST dialect

pub mod client;
pub mod dialect;
pub mod error;
pub mod query;

pub use client::{build_http_client, EntityGateway};
pub use dialect::{shaper_for, BackendRequest, ODataShaper, RequestShaper, RestShaper};
pub use error::{ErrorContext, ErrorKind, FieldError, GatewayError, Operation};
pub use query::{
    Connector, EntityPayload, GetOptions, ODataQuery, ODataResponse, QueryResult, QuerySpec,
    SearchPage, SearchQuery,
};
