use serde::Serialize;

use crate::catalog::Channel;
use crate::server::utils::header_utils::HeaderOverrides;
use crate::server::utils::proxy_url_utils::proxy_link;

/// a channel as players see it, the upstream url and its headers are folded into `stream_url`
#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ChannelDto {
    pub id: String,
    pub name: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub logo: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub channel_number: Option<u32>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub group: Option<String>,
    pub stream_url: String,
}

impl ChannelDto {
    pub fn from_channel(channel: &Channel, addon_base: &str) -> Self {
        let (url, headers) = channel.stream_target();
        let overrides = HeaderOverrides::from_map(headers);

        Self {
            id: channel.id.clone(),
            name: channel.name.clone(),
            logo: channel.logo.clone(),
            channel_number: channel.channel_number,
            group: channel.group.clone(),
            stream_url: proxy_link(addon_base, &url, overrides.to_query_value().as_deref()),
        }
    }
}
