pub mod carrier;
pub mod dictionary;
pub mod query_parser;
