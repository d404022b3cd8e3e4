pub mod changeset;
pub mod model;
