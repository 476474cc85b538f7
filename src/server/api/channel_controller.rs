use axum::{
    Extension, Json, Router,
    extract::Path,
    http::HeaderMap,
    routing::get,
};
use tracing::debug;

use crate::server::{
    dtos::channel_dto::ChannelDto,
    error::{AppResult, Error},
    services::edge_services::EdgeServices,
    utils::proxy_url_utils::addon_base,
};

/// read only view of the registry, every stream url already points back through /proxy
pub struct ChannelController;

impl ChannelController {
    pub fn app() -> Router {
        Router::new()
            .route("/channels", get(Self::list_channels))
            .route("/channels/{id}", get(Self::get_channel))
    }

    async fn list_channels(
        Extension(services): Extension<EdgeServices>,
        headers: HeaderMap,
    ) -> Json<Vec<ChannelDto>> {
        let snapshot = services.registry.get().await;
        let base = addon_base(&headers, &services.config);

        let channels: Vec<ChannelDto> = snapshot
            .channels
            .iter()
            .map(|channel| ChannelDto::from_channel(channel, &base))
            .collect();

        debug!("listing {} channels", channels.len());

        Json(channels)
    }

    async fn get_channel(
        Extension(services): Extension<EdgeServices>,
        Path(id): Path<String>,
        headers: HeaderMap,
    ) -> AppResult<Json<ChannelDto>> {
        let channel = services
            .registry
            .get_channel(&id)
            .await
            .ok_or_else(|| Error::NotFound(format!("no channel with id {}", id)))?;

        let base = addon_base(&headers, &services.config);
        Ok(Json(ChannelDto::from_channel(&channel, &base)))
    }
}
