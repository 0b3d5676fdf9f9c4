pub mod connector;
pub mod refresh;

#[cfg(test)]
pub(crate) mod mock;
