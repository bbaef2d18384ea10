pub mod error;
pub mod models {
    pub mod document;
}
pub mod rendering {
    pub mod html;
    pub mod plain_text;
    pub mod reading_time;
    pub mod slug;
}
pub mod db {
    pub mod engagement_repository;
    pub mod maintenance;
    pub mod memory;
    pub mod models;
    pub mod repository;
}
pub mod storage {
    pub mod client;
}
pub mod auth {
    pub mod admin;
    #[cfg(feature = "ssr")]
    pub mod middleware;
}
pub mod autosave {
    pub mod coordinator;
    pub mod images;
    #[cfg(feature = "client")]
    pub mod http;
}

#[cfg(feature = "ssr")]
pub mod config;
#[cfg(feature = "ssr")]
pub mod api {
    pub mod errors;
    pub mod feeds;
    pub mod posts;
    pub mod public;
    pub mod upload;
}
#[cfg(feature = "ssr")]
pub mod pages;
#[cfg(feature = "ssr")]
pub mod app;
