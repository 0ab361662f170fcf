//! TomTom Routing and Traffic Flow
//!
//! Routing provider backed by the TomTom Routing API and speed provider
//! backed by the Traffic Flow Segment API.
//!
//! # Endpoints
//!
//! - `/routing/1/calculateRoute/{origin}:{destination}/json` with
//!   `traffic=true&computeTravelTimeFor=all`, which returns the live travel
//!   time plus historic and no-traffic estimates in the route summary
//! - `/traffic/services/4/flowSegmentData/absolute/10/json?point=lat,lon`
//!
//! Both share one `reqwest::Client`, so the client timeout bounds every call.

use async_trait::async_trait;
use serde_json::Value;
use tracing::debug;

use super::traits::{RouteProvider, SpeedProvider, UpstreamError};
use crate::model::{GeoPoint, RouteMeasurement, SpeedSample};

/// Default API host
pub const DEFAULT_BASE_URL: &str = "https://api.tomtom.com";

/// TomTom routing provider
#[derive(Clone)]
pub struct TomTomRouting {
    base_url: String,
    api_key: String,
    http_client: reqwest::Client,
}

impl TomTomRouting {
    /// Create a routing provider
    pub fn new(
        base_url: impl Into<String>,
        api_key: impl Into<String>,
        http_client: reqwest::Client,
    ) -> Self {
        Self {
            base_url: trim_base(base_url.into()),
            api_key: api_key.into(),
            http_client,
        }
    }

    fn route_url(&self, origin: &GeoPoint, destination: &GeoPoint) -> String {
        format!(
            "{}/routing/1/calculateRoute/{}:{}/json",
            self.base_url,
            origin.coordinate_pair(),
            destination.coordinate_pair()
        )
    }
}

#[async_trait]
impl RouteProvider for TomTomRouting {
    fn name(&self) -> &str {
        "TomTom Routing"
    }

    async fn route(
        &self,
        origin: &GeoPoint,
        destination: &GeoPoint,
    ) -> Result<RouteMeasurement, UpstreamError> {
        let response = self
            .http_client
            .get(self.route_url(origin, destination))
            .query(&[
                ("key", self.api_key.as_str()),
                ("traffic", "true"),
                ("computeTravelTimeFor", "all"),
                ("routeType", "fastest"),
                ("travelMode", "car"),
            ])
            .send()
            .await?;

        if !response.status().is_success() {
            let status = response.status().as_u16();
            let body = response.text().await.unwrap_or_default();
            return Err(UpstreamError::Status { status, body });
        }

        let data: Value = response.json().await?;
        parse_route_summary(&data)
    }
}

/// Extract a [`RouteMeasurement`] from a `calculateRoute` payload
///
/// # Errors
///
/// [`UpstreamError::NoRoute`] when the payload has no routes,
/// [`UpstreamError::Malformed`] when the first route lacks its travel time or length.
pub fn parse_route_summary(data: &Value) -> Result<RouteMeasurement, UpstreamError> {
    let summary = data
        .get("routes")
        .and_then(Value::as_array)
        .and_then(|routes| routes.first())
        .ok_or(UpstreamError::NoRoute)?
        .get("summary")
        .ok_or_else(|| UpstreamError::Malformed("route has no summary".to_string()))?;

    let field = |name: &str| summary.get(name).and_then(Value::as_u64);

    let traffic_secs = field("travelTimeInSeconds")
        .ok_or_else(|| UpstreamError::Malformed("missing travelTimeInSeconds".to_string()))?;
    let length_meters = field("lengthInMeters")
        .ok_or_else(|| UpstreamError::Malformed("missing lengthInMeters".to_string()))?;

    Ok(RouteMeasurement::from_provider(
        traffic_secs,
        field("historicTrafficTravelTimeInSeconds"),
        field("noTrafficTravelTimeInSeconds"),
        length_meters,
    ))
}

/// TomTom traffic flow provider
#[derive(Clone)]
pub struct TomTomFlow {
    base_url: String,
    api_key: String,
    http_client: reqwest::Client,
}

impl TomTomFlow {
    /// Create a flow provider
    pub fn new(
        base_url: impl Into<String>,
        api_key: impl Into<String>,
        http_client: reqwest::Client,
    ) -> Self {
        Self {
            base_url: trim_base(base_url.into()),
            api_key: api_key.into(),
            http_client,
        }
    }

    fn flow_url(&self) -> String {
        format!(
            "{}/traffic/services/4/flowSegmentData/absolute/10/json",
            self.base_url
        )
    }
}

#[async_trait]
impl SpeedProvider for TomTomFlow {
    fn name(&self) -> &str {
        "TomTom Flow"
    }

    async fn speed_at(&self, point: &GeoPoint) -> Result<Option<SpeedSample>, UpstreamError> {
        let response = self
            .http_client
            .get(self.flow_url())
            .query(&[
                ("key", self.api_key.as_str()),
                ("point", point.coordinate_pair().as_str()),
                ("unit", "KMPH"),
            ])
            .send()
            .await?;

        if !response.status().is_success() {
            let status = response.status().as_u16();
            let body = response.text().await.unwrap_or_default();
            return Err(UpstreamError::Status { status, body });
        }

        let data: Value = response.json().await?;
        let sample = parse_flow_segment(&data);
        if sample.is_none() {
            debug!(point = %point.coordinate_pair(), "No flow segment at point");
        }
        Ok(sample)
    }
}

/// Extract a [`SpeedSample`] from a `flowSegmentData` payload, `None` if absent
#[must_use]
pub fn parse_flow_segment(data: &Value) -> Option<SpeedSample> {
    let segment = data.get("flowSegmentData")?;
    let current = segment.get("currentSpeed").and_then(Value::as_f64)?;
    let free_flow = segment.get("freeFlowSpeed").and_then(Value::as_f64)?;
    Some(SpeedSample::new(current, free_flow))
}

fn trim_base(mut url: String) -> String {
    while url.ends_with('/') {
        url.pop();
    }
    url
}
