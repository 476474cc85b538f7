pub mod header_utils;
pub mod playlist_utils;
pub mod proxy_url_utils;
