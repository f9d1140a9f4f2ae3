extern crate chrono_tz;

use crate::aggregate;
use crate::config;
use crate::result;
use crate::stations;
use crate::store;

// Built once at startup and shared read-only by every selection.
pub struct AppContext {
    pub config: config::Config,
    pub stations: Vec<stations::Station>,
}

impl AppContext {
    pub fn new(config: config::Config, stations: Vec<stations::Station>) -> AppContext {
        return AppContext{
            config: config,
            stations: stations,
        };
    }

    pub fn find_station(&self, name: &str) -> Option<&stations::Station> {
        return stations::find_station(&self.stations, name);
    }
}

pub struct StationView {
    pub station: stations::Station,
    pub latest: Option<store::Reading>,
    pub occupancy: aggregate::Occupancy,
    pub timezone: chrono_tz::Tz,
}

// One selection: look up the station, read its history with a fresh store
// connection, and aggregate it.
pub fn load_station_view(ctx: &AppContext, name: &str) -> result::BikeDashResult<StationView> {
    let station = ctx.find_station(name).ok_or(
        result::make_error(&format!("Unknown station '{}'", name)))?;

    info!("Loading {} ({})", station.name, station.id);
    return store::with_store(&ctx.config.conn_str, |store| {
        fetch_station_view(station, store, ctx.config.timezone)
    });
}

pub fn fetch_station_view(station: &stations::Station,
                          store: &dyn store::TimeSeriesStore,
                          timezone: chrono_tz::Tz) -> result::BikeDashResult<StationView> {
    let history = store.get_history(&station.id)?;
    let latest = store.get_latest(&station.id)?;

    let visible = aggregate::trim_warmup(history);
    if visible.is_empty() {
        info!("No visible readings for {}", station.id);
    }

    return Ok(StationView{
        station: station.clone(),
        latest: latest,
        occupancy: aggregate::aggregate(&visible, timezone),
        timezone: timezone,
    });
}

// Feed stations paired with whether the store has any readings for them.
pub fn stations_with_history(ctx: &AppContext) -> result::BikeDashResult<Vec<(&stations::Station, bool)>> {
    let known: std::collections::HashSet<String> = store::with_store(&ctx.config.conn_str, |store| {
        store.station_ids()
    })?.into_iter().collect();

    return Ok(ctx.stations.iter()
        .map(|s| (s, known.contains(&s.id)))
        .collect());
}
