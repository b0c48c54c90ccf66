//! HTTP acquisition: plain requests for feeds, linked assets and
//! browser-less crawling. Rendering lives in [`crate::renderer`].

pub mod http_client;
