// Index queries

pub mod engine;
