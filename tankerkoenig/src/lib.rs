//!
//! This crate queries the [Tankerkoenig](https://creativecommons.tankerkoenig.de) API, which
//! publishes the fuel prices reported to the german Markttransparenzstelle für Kraftstoffe
//! (MTS-K). Data is served as JSON and licensed under CC BY 4.0.
//!
//! The entry point of the crate is [Client::new], which talks to the public API with the demo
//! key, and [Client::with_options] to point it at another base URL or key.
//!
//! All requests are blocking and made one at a time. Responses are never cached and failed
//! requests are never retried.
//!

use std::{collections::HashMap, fmt, io::Read, str::FromStr};

use itertools::Itertools;
use serde::{de::DeserializeOwned, Deserialize};

pub mod report;

#[cfg(test)]
mod canned;

/// Public API endpoint.
pub const BASE_URL: &str = "https://creativecommons.tankerkoenig.de/json/";

/// Key of the public demo account, used when no other key is configured.
pub const DEMO_API_KEY: &str = "1cc54b68-f8d6-43ae-dda9-a6502617f8ec";

/// The prices endpoint accepts at most this many station ids per request.
pub const MAX_PRICE_IDS: usize = 10;

/// The list endpoint rejects search radiuses above this (in km).
pub const MAX_RADIUS: f64 = 25.0;

#[derive(Debug, thiserror::Error)]
pub enum Error {
    #[error("error while fetching data")]
    Transport(#[from] ureq::Transport),
    #[error("request not successful, status code {code} | {text}")]
    Status { code: u16, text: String },
    #[error("error while reading the response body")]
    IO(#[from] std::io::Error),
    #[error("could not decode response")]
    Decode(#[from] serde_json::Error),
    #[error("request not successful: {0}")]
    Rejected(String),
    #[error("area '{0}' is not of the form <latitude>,<longitude>,<radius>")]
    InvalidArea(String),
    #[error("radius {0} is out of range, expected a value in (0, 25] km")]
    InvalidRadius(f64),
    #[error("no station ids were given")]
    NoStations,
}

type Result<T, E = Error> = std::result::Result<T, E>;

/// Common envelope of every API response. Missing keys take their zero value.
#[derive(Debug, Clone, Default, PartialEq, Eq, Deserialize)]
#[serde(default)]
pub struct ApiResult {
    #[serde(deserialize_with = "null_as_default")]
    pub ok: bool,
    #[serde(deserialize_with = "null_as_default")]
    pub message: String,
    #[serde(deserialize_with = "null_as_default")]
    pub status: String,
    #[serde(deserialize_with = "null_as_default")]
    pub data: String,
    #[serde(deserialize_with = "null_as_default")]
    pub license: String,
}

impl ApiResult {
    fn check(&self) -> Result<()> {
        match self.ok {
            true => Ok(()),
            false => Err(Error::Rejected(self.message.clone())),
        }
    }
}

/// Responses wrapping an [ApiResult].
pub trait Envelope {
    fn result(&self) -> &ApiResult;
}

/// Keys sent as `null` take their zero value, like missing keys.
fn null_as_default<'de, D, T>(deserializer: D) -> Result<T, D::Error>
where
    D: serde::Deserializer<'de>,
    T: Deserialize<'de> + Default,
{
    Ok(Option::<T>::deserialize(deserializer)?.unwrap_or_default())
}

/// Prices are sent as a number, or as `false`/`null` when the fuel is not sold.
fn price_or_false<'de, D>(deserializer: D) -> Result<Option<f64>, D::Error>
where
    D: serde::Deserializer<'de>,
{
    struct Visitor;
    impl<'de> serde::de::Visitor<'de> for Visitor {
        type Value = Option<f64>;

        fn expecting(&self, formatter: &mut fmt::Formatter) -> fmt::Result {
            formatter.write_str("a price or false")
        }

        fn visit_f64<E>(self, v: f64) -> Result<Self::Value, E>
        where
            E: serde::de::Error,
        {
            Ok(Some(v))
        }

        fn visit_u64<E>(self, v: u64) -> Result<Self::Value, E>
        where
            E: serde::de::Error,
        {
            Ok(Some(v as f64))
        }

        fn visit_i64<E>(self, v: i64) -> Result<Self::Value, E>
        where
            E: serde::de::Error,
        {
            Ok(Some(v as f64))
        }

        fn visit_bool<E>(self, v: bool) -> Result<Self::Value, E>
        where
            E: serde::de::Error,
        {
            match v {
                false => Ok(None),
                true => Err(E::invalid_value(serde::de::Unexpected::Bool(v), &self)),
            }
        }

        fn visit_none<E>(self) -> Result<Self::Value, E>
        where
            E: serde::de::Error,
        {
            Ok(None)
        }

        fn visit_unit<E>(self) -> Result<Self::Value, E>
        where
            E: serde::de::Error,
        {
            Ok(None)
        }
    }

    deserializer.deserialize_any(Visitor)
}

/// Post codes are numbers in some responses and strings in others.
fn string_or_number<'de, D>(deserializer: D) -> Result<String, D::Error>
where
    D: serde::Deserializer<'de>,
{
    struct Visitor;
    impl<'de> serde::de::Visitor<'de> for Visitor {
        type Value = String;

        fn expecting(&self, formatter: &mut fmt::Formatter) -> fmt::Result {
            formatter.write_str("a string or an integer")
        }

        fn visit_str<E>(self, v: &str) -> Result<Self::Value, E>
        where
            E: serde::de::Error,
        {
            Ok(v.into())
        }

        fn visit_u64<E>(self, v: u64) -> Result<Self::Value, E>
        where
            E: serde::de::Error,
        {
            Ok(format!("{v:05}"))
        }

        fn visit_i64<E>(self, v: i64) -> Result<Self::Value, E>
        where
            E: serde::de::Error,
        {
            Ok(v.to_string())
        }

        fn visit_none<E>(self) -> Result<Self::Value, E>
        where
            E: serde::de::Error,
        {
            Ok(String::new())
        }

        fn visit_unit<E>(self) -> Result<Self::Value, E>
        where
            E: serde::de::Error,
        {
            Ok(String::new())
        }
    }

    deserializer.deserialize_any(Visitor)
}

/// Kinds of fuels reported by the API
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Fuel {
    Diesel,
    E5,
    E10,
}

impl fmt::Display for Fuel {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Fuel::Diesel => f.write_str("Diesel"),
            Fuel::E5 => f.write_str("Super E5"),
            Fuel::E10 => f.write_str("Super E10"),
        }
    }
}

fn available(
    diesel: Option<f64>,
    e5: Option<f64>,
    e10: Option<f64>,
) -> impl Iterator<Item = (Fuel, f64)> {
    [(Fuel::Diesel, diesel), (Fuel::E5, e5), (Fuel::E10, e10)]
        .into_iter()
        .filter_map(|(fuel, price)| price.map(|p| (fuel, p)))
}

/// A single gas station, as returned by the list and detail endpoints.
#[derive(Debug, Clone, Default, Deserialize)]
#[serde(default, rename_all = "camelCase")]
pub struct Station {
    #[serde(deserialize_with = "null_as_default")]
    pub id: String,
    #[serde(deserialize_with = "null_as_default")]
    pub name: String,
    #[serde(deserialize_with = "null_as_default")]
    pub brand: String,
    #[serde(deserialize_with = "null_as_default")]
    pub street: String,
    pub house_number: Option<String>,
    #[serde(deserialize_with = "string_or_number")]
    pub post_code: String,
    #[serde(deserialize_with = "null_as_default")]
    pub place: String,
    #[serde(deserialize_with = "null_as_default")]
    pub lat: f64,
    #[serde(deserialize_with = "null_as_default")]
    pub lng: f64,
    /// Distance from the searched point in km. Only set by the list endpoint.
    pub dist: Option<f64>,
    #[serde(deserialize_with = "price_or_false")]
    pub diesel: Option<f64>,
    #[serde(deserialize_with = "price_or_false")]
    pub e5: Option<f64>,
    #[serde(deserialize_with = "price_or_false")]
    pub e10: Option<f64>,
    #[serde(deserialize_with = "null_as_default")]
    pub is_open: bool,
}

impl Station {
    /// Prices of the fuels sold at this station
    pub fn prices(&self) -> impl Iterator<Item = (Fuel, f64)> {
        available(self.diesel, self.e5, self.e10)
    }

    pub fn address(&self) -> String {
        match self.house_number.as_deref().map(str::trim) {
            None | Some("") => self.street.trim().to_owned(),
            Some(number) => format!("{} {number}", self.street.trim()),
        }
    }
}

#[derive(Debug, Clone, Deserialize)]
pub struct StationList {
    #[serde(flatten)]
    pub result: ApiResult,
    #[serde(default)]
    pub stations: Vec<Station>,
}

impl Envelope for StationList {
    fn result(&self) -> &ApiResult {
        &self.result
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Deserialize)]
pub enum PriceStatus {
    #[serde(rename = "open")]
    Open,
    #[serde(rename = "closed")]
    Closed,
    #[serde(rename = "no prices")]
    NoPrices,
    #[default]
    #[serde(other)]
    Unknown,
}

/// Current prices of a single station.
#[derive(Debug, Clone, Default, Deserialize)]
#[serde(default)]
pub struct StationPrices {
    pub status: PriceStatus,
    #[serde(deserialize_with = "price_or_false")]
    pub diesel: Option<f64>,
    #[serde(deserialize_with = "price_or_false")]
    pub e5: Option<f64>,
    #[serde(deserialize_with = "price_or_false")]
    pub e10: Option<f64>,
}

impl StationPrices {
    pub fn prices(&self) -> impl Iterator<Item = (Fuel, f64)> {
        available(self.diesel, self.e5, self.e10)
    }
}

#[derive(Debug, Clone, Deserialize)]
pub struct PriceList {
    #[serde(flatten)]
    pub result: ApiResult,
    #[serde(default)]
    pub prices: HashMap<String, StationPrices>,
}

impl Envelope for PriceList {
    fn result(&self) -> &ApiResult {
        &self.result
    }
}

#[derive(Debug, Clone, Default, Deserialize)]
#[serde(default)]
pub struct OpeningTime {
    #[serde(deserialize_with = "null_as_default")]
    pub text: String,
    #[serde(deserialize_with = "null_as_default")]
    pub start: String,
    #[serde(deserialize_with = "null_as_default")]
    pub end: String,
}

/// A [Station] along with its opening hours
#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct DetailedStation {
    #[serde(flatten)]
    pub station: Station,
    #[serde(default, deserialize_with = "null_as_default")]
    pub opening_times: Vec<OpeningTime>,
    #[serde(default, deserialize_with = "null_as_default")]
    pub override_opening_times: Vec<String>,
    #[serde(default, deserialize_with = "null_as_default")]
    pub whole_day: bool,
    #[serde(default)]
    pub state: Option<String>,
}

#[derive(Debug, Clone, Deserialize)]
pub struct StationDetail {
    #[serde(flatten)]
    pub result: ApiResult,
    #[serde(default)]
    pub station: Option<DetailedStation>,
}

impl Envelope for StationDetail {
    fn result(&self) -> &ApiResult {
        &self.result
    }
}

/// A circular search area. The radius is in km.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Area {
    pub latitude: f64,
    pub longitude: f64,
    pub radius: f64,
}

impl Default for Area {
    fn default() -> Self {
        Self {
            latitude: 0.0,
            longitude: 9.341125,
            radius: 2.0,
        }
    }
}

impl FromStr for Area {
    type Err = Error;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let invalid = || Error::InvalidArea(s.into());

        let Some((latitude, longitude, radius)) = s.split(',').map(str::trim).collect_tuple()
        else {
            return Err(invalid());
        };

        let area = Self {
            latitude: latitude.parse().map_err(|_| invalid())?,
            longitude: longitude.parse().map_err(|_| invalid())?,
            radius: radius.parse().map_err(|_| invalid())?,
        };

        if !(area.latitude.is_finite() && area.longitude.is_finite()) {
            return Err(invalid());
        }

        if !(area.radius > 0.0 && area.radius <= MAX_RADIUS) {
            return Err(Error::InvalidRadius(area.radius));
        }

        Ok(area)
    }
}

/// Blocking API client
pub struct Client {
    agent: ureq::Agent,
    base_url: String,
    api_key: String,
}

/// Builder for a [Client], created by [Client::with_options]
pub struct ClientBuilder {
    base_url: String,
    api_key: String,
}

/// Strips the query, and with it the API key, for logging.
fn endpoint(url: &str) -> &str {
    url.split_once('?').map_or(url, |(path, _)| path)
}

/// Reads the whole body of a response. The size is not capped.
pub fn read_body(response: ureq::Response) -> std::io::Result<Vec<u8>> {
    let mut body = Vec::new();
    response.into_reader().read_to_end(&mut body)?;
    Ok(body)
}

impl Client {
    /// Create a [ClientBuilder] to be able to customize the options. See it's documentation for
    /// more information on options.
    pub fn with_options() -> ClientBuilder {
        ClientBuilder {
            base_url: BASE_URL.into(),
            api_key: DEMO_API_KEY.into(),
        }
    }

    /// Create a [Client] for the public API using the demo key
    pub fn new() -> Self {
        Self::with_options().build()
    }

    /// URL listing all stations of an area, with the prices of every fuel.
    pub fn list_url(&self, area: &Area) -> String {
        format!(
            "{}list.php?lat={}&lng={}&rad={}&type=all&apikey={}",
            self.base_url, area.latitude, area.longitude, area.radius, self.api_key
        )
    }

    pub fn prices_url<S: AsRef<str>>(&self, ids: &[S]) -> String {
        format!(
            "{}prices.php?ids={}&apikey={}",
            self.base_url,
            ids.iter().map(|id| id.as_ref()).join(","),
            self.api_key
        )
    }

    pub fn detail_url(&self, id: &str) -> String {
        format!("{}detail.php?id={id}&apikey={}", self.base_url, self.api_key)
    }

    /// Perform a single GET request.
    ///
    /// Only transport failures are errors, responses with an error status are returned like
    /// any other response so the caller can inspect them.
    pub fn call(&self, url: &str) -> Result<ureq::Response, ureq::Transport> {
        log::debug!("fetching data at {}", endpoint(url));

        match self.agent.get(url).call() {
            Ok(response) => Ok(response),
            Err(ureq::Error::Status(_, response)) => Ok(response),
            Err(ureq::Error::Transport(transport)) => Err(transport),
        }
    }

    fn get_json<T>(&self, url: &str) -> Result<T>
    where
        T: DeserializeOwned + Envelope,
    {
        let response = self.call(url)?;

        if response.status() != 200 {
            return Err(Error::Status {
                code: response.status(),
                text: response.status_text().into(),
            });
        }

        let value: T = serde_json::from_slice(&read_body(response)?)?;
        value.result().check()?;

        Ok(value)
    }

    /// Fetch the stations around a point.
    pub fn list(&self, area: &Area) -> Result<StationList> {
        self.get_json(&self.list_url(area))
    }

    /// Fetch the stations of several areas. Stations present in more than one area are only
    /// returned once.
    pub fn list_areas(&self, areas: &[Area]) -> Result<Vec<Station>> {
        let mut stations = Vec::new();

        for area in areas {
            log::info!(
                "requesting stations around [{} - {}] with radius {}",
                area.latitude,
                area.longitude,
                area.radius
            );
            stations.extend(self.list(area)?.stations);
        }

        Ok(stations
            .into_iter()
            .unique_by(|station| station.id.clone())
            .collect())
    }

    /// Fetch the current prices of the given stations, by batches of [MAX_PRICE_IDS].
    pub fn prices<S: AsRef<str>>(&self, ids: &[S]) -> Result<HashMap<String, StationPrices>> {
        if ids.is_empty() {
            return Err(Error::NoStations);
        }

        let mut prices = HashMap::new();
        for batch in ids.chunks(MAX_PRICE_IDS) {
            log::info!(
                "requesting prices for stations [{}]",
                batch.iter().map(|id| id.as_ref()).join(", ")
            );
            let list: PriceList = self.get_json(&self.prices_url(batch))?;
            prices.extend(list.prices);
        }

        Ok(prices)
    }

    /// Fetch everything known about a single station.
    pub fn detail(&self, id: &str) -> Result<StationDetail> {
        self.get_json(&self.detail_url(id))
    }
}

impl Default for Client {
    fn default() -> Self {
        Self::new()
    }
}

impl ClientBuilder {
    /// Root of the API, endpoints are resolved relative to it. Defaults to [BASE_URL].
    pub fn base_url(self, base_url: impl Into<String>) -> Self {
        let mut base_url = base_url.into();
        if !base_url.ends_with('/') {
            base_url.push('/');
        }

        Self { base_url, ..self }
    }

    /// Defaults to [DEMO_API_KEY].
    pub fn api_key(self, api_key: impl Into<String>) -> Self {
        Self {
            api_key: api_key.into(),
            ..self
        }
    }

    /// Create a [Client] using the specified options.
    pub fn build(self) -> Client {
        Client {
            agent: ureq::AgentBuilder::new()
                .user_agent(concat!("tankerkoenig/", env!("CARGO_PKG_VERSION")))
                .build(),
            base_url: self.base_url,
            api_key: self.api_key,
        }
    }
}
