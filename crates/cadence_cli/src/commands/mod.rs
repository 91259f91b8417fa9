pub(crate) mod ingest;
pub(crate) mod limits;
pub(crate) mod login;
pub(crate) mod migrate;
pub(crate) mod validate;
