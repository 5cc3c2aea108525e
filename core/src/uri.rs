//! Request URI construction.

use url::Url;

use crate::command::Command;
use crate::config::ClientSettings;
use crate::error::ApiError;

/// Builds the target URI of a call.
pub trait UriBuilder: Send + Sync + 'static {
    fn build_uri(
        &self,
        command: &Command,
        settings: &ClientSettings,
        query_params: &[(String, String)],
    ) -> Result<Url, ApiError>;
}

/// Default layout: `{base}{country}/{path}?client_id=..&lang=..&{query}`.
#[derive(Debug, Clone, Copy, Default)]
pub struct ApiUriBuilder;

impl UriBuilder for ApiUriBuilder {
    fn build_uri(
        &self,
        command: &Command,
        settings: &ClientSettings,
        query_params: &[(String, String)],
    ) -> Result<Url, ApiError> {
        let base = if command.secure {
            &settings.secure_api_base_uri
        } else {
            &settings.api_base_uri
        };
        let mut base = Url::parse(base)?;
        if !base.path().ends_with('/') {
            let path = format!("{}/", base.path());
            base.set_path(&path);
        }

        let relative = if command.requires_country {
            format!("{}/{}", settings.country_code, command.path)
        } else {
            command.path.clone()
        };
        let mut uri = base.join(&relative)?;

        {
            let mut query = uri.query_pairs_mut();
            if !settings.client_id.is_empty() {
                query.append_pair("client_id", &settings.client_id);
            }
            if let Some(lang) = settings.language.as_deref() {
                query.append_pair("lang", lang);
            }
            for (key, value) in query_params {
                query.append_pair(key, value);
            }
        }
        if uri.query() == Some("") {
            uri.set_query(None);
        }
        Ok(uri)
    }
}
