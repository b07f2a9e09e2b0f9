//! Crate-internal test suites that span more than one module.

#[cfg(test)]
mod events;
