pub(crate) mod device;
pub(crate) mod endpoint;
pub(crate) mod generator;
pub(crate) mod node;
pub(crate) mod sink;
