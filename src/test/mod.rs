//! Shared test doubles


pub(crate) use gated::GatedApi;
