pub mod cache;
pub mod catalog;
pub mod config;
pub mod decoded;
pub mod error;
pub mod fetch;
pub mod output;
pub mod parser;
pub mod service;

pub mod gtfs_rt {
    include!(concat!(env!("OUT_DIR"), "/transit_realtime.rs"));
}
