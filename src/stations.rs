// Station directory, from the TfL cycle hire feed:
// https://tfl.gov.uk/tfl/syndication/feeds/cycle-hire/livecyclehireupdates.xml
//
// <stations lastUpdate="..." version="2.0">
//   <station>
//     <id>1</id>
//     <name>River Street , Clerkenwell</name>
//     <terminalName>001023</terminalName>
//     <lat>51.52916347</lat>
//     <long>-0.109970527</long>
//     ...
//   </station>
// </stations>
extern crate reqwest;
extern crate serde_xml_rs;

use crate::result;

#[derive(Debug, Clone, PartialEq)]
pub struct Station {
    pub name: String,
    pub id: String,
    pub lat: f64,
    pub lon: f64,
}

#[derive(Deserialize, Debug)]
struct FeedStations {
    #[serde(rename = "station", default)]
    stations: Vec<FeedStation>,
}

#[derive(Deserialize, Debug)]
#[serde(rename_all = "camelCase")]
struct FeedStation {
    name: Option<String>,
    terminal_name: Option<String>,
    lat: Option<String>,
    long: Option<String>,
}

pub fn list_stations(feed_url: &str) -> result::BikeDashResult<Vec<Station>> {
    return list_stations_ext(feed_url, real_fetch);
}

fn list_stations_ext<F>(feed_url: &str, fetch_fn: F) -> result::BikeDashResult<Vec<Station>>
where F: Fn(&str) -> result::BikeDashResult<String> {
    let body = fetch_fn(feed_url)?;
    let stations = parse_feed(&body)?;
    info!("Loaded {} stations from {}", stations.len(), feed_url);
    return Ok(stations);
}

fn real_fetch(url: &str) -> result::BikeDashResult<String> {
    debug!("Fetching {}", url);
    let client = reqwest::blocking::Client::new();
    let response = client.get(url)
        .header(reqwest::header::USER_AGENT, "bikedash")
        .send()?;

    let status = response.status();
    if !status.is_success() {
        return Err(result::BikeDashError::FeedUnavailable(
            format!("{} returned {}", url, status)));
    }

    return Ok(response.text()?);
}

fn parse_feed(body: &str) -> result::BikeDashResult<Vec<Station>> {
    let feed: FeedStations = serde_xml_rs::from_str(body)?;

    return feed.stations.into_iter()
        .enumerate()
        .map(|(i, s)| to_station(i, s))
        .collect();
}

fn to_station(index: usize, raw: FeedStation) -> result::BikeDashResult<Station> {
    let missing = |field: &str| {
        result::BikeDashError::FeedMalformed(
            format!("station #{} has no <{}>", index, field))
    };

    let name = raw.name.ok_or(missing("name"))?;
    let id = raw.terminal_name.ok_or(missing("terminalName"))?;
    let lat = parse_coordinate(index, "lat", raw.lat.ok_or(missing("lat"))?)?;
    let lon = parse_coordinate(index, "long", raw.long.ok_or(missing("long"))?)?;

    return Ok(Station{
        name: name.trim().to_string(),
        id: id.trim().to_string(),
        lat: lat,
        lon: lon,
    });
}

fn parse_coordinate(index: usize, field: &str, value: String) -> result::BikeDashResult<f64> {
    return value.trim().parse::<f64>().map_err(|_| {
        result::BikeDashError::FeedMalformed(
            format!("station #{} has bad <{}>: '{}'", index, field, value))
    });
}

// Names aren't unique in the feed, first one wins.
pub fn find_station<'a>(stations: &'a [Station], name: &str) -> Option<&'a Station> {
    return stations.iter().find(|s| s.name == name);
}
