//! API clients for the external indexer planes.

pub mod data_api;
pub mod graphql;
pub mod subgraph;

pub use data_api::DataApiClient;
pub use graphql::GraphqlClient;
pub use subgraph::SubgraphClient;
