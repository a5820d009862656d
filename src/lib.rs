pub mod etl;
pub mod geo;
pub mod model;
pub mod stats;
pub mod stops;
pub mod store;
