//! Query parameters shared by several endpoints.

use serde::Deserialize;
use utoipa::IntoParams;

use crate::domain::{FormFactor, TimeWindow, TrackedUrl};
use crate::error::SitewatchError;

/// `?url=` selector.
///
/// The parameter is optional at the extractor level so that a missing
/// value produces the JSON error body instead of a plain-text rejection.
#[derive(Debug, Clone, Deserialize, IntoParams)]
#[into_params(parameter_in = Query)]
pub struct UrlQuery {
    /// Absolute `http`/`https` URL; normalized before lookup.
    #[serde(default)]
    pub url: Option<String>,
}

impl UrlQuery {
    /// Parses and normalizes the `url` parameter.
    ///
    /// # Errors
    ///
    /// Returns [`SitewatchError::InvalidRequest`] when the parameter is
    /// missing and [`SitewatchError::InvalidUrl`] when it does not parse.
    pub fn tracked_url(&self) -> Result<TrackedUrl, SitewatchError> {
        required_url(self.url.as_deref())
    }
}

/// `?url=&window=` selector for result and snapshot reads.
#[derive(Debug, Clone, Deserialize, IntoParams)]
#[into_params(parameter_in = Query)]
pub struct WindowQuery {
    /// Absolute `http`/`https` URL; normalized before lookup.
    #[serde(default)]
    pub url: Option<String>,
    /// One of `now`, `1h`, `24h`, `1w`, `1m`.
    #[serde(default)]
    pub window: Option<String>,
    /// `mobile` (default) or `desktop`; selects the audits a performance
    /// summary is computed over.
    #[serde(default)]
    pub form_factor: Option<String>,
}

impl WindowQuery {
    /// Parses both parameters.
    ///
    /// # Errors
    ///
    /// Returns [`SitewatchError::InvalidRequest`] for missing parameters,
    /// [`SitewatchError::InvalidUrl`] or
    /// [`SitewatchError::InvalidTimeWindow`] for unparsable ones.
    pub fn parse(&self) -> Result<(TrackedUrl, TimeWindow), SitewatchError> {
        let url = required_url(self.url.as_deref())?;
        let window = self
            .window
            .as_deref()
            .ok_or_else(|| SitewatchError::InvalidRequest("missing `window` parameter".into()))?
            .parse()?;
        Ok((url, window))
    }

    /// Parses the optional `form_factor` parameter.
    ///
    /// # Errors
    ///
    /// Returns [`SitewatchError::InvalidRequest`] for values other than
    /// `mobile` and `desktop`.
    pub fn form_factor(&self) -> Result<FormFactor, SitewatchError> {
        self.form_factor
            .as_deref()
            .map_or(Ok(FormFactor::Mobile), str::parse)
    }
}

fn required_url(raw: Option<&str>) -> Result<TrackedUrl, SitewatchError> {
    let raw =
        raw.ok_or_else(|| SitewatchError::InvalidRequest("missing `url` parameter".into()))?;
    TrackedUrl::parse(raw)
}
