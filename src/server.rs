extern crate base64;
extern crate html_escape;
extern crate querystring;
extern crate serde_json;
extern crate tiny_http;
extern crate urlencoding;

use anyhow::Context;
use base64::Engine;

use crate::dashboard;
use crate::drawing;
use crate::result;

pub struct Page {
    pub status: u16,
    pub content_type: &'static str,
    pub body: Vec<u8>,
}

#[derive(Serialize)]
struct StationJson<'a> {
    name: &'a str,
    id: &'a str,
    lat: f64,
    lon: f64,
}

#[derive(Serialize)]
struct ReadingJson {
    timestamp: String,
    e_bikes: u32,
    standard_bikes: u32,
    empty_docks: u32,
}

#[derive(Serialize)]
struct HeatmapJson {
    days: Vec<String>,
    times: Vec<String>,
    values: Vec<Vec<f64>>,
}

#[derive(Serialize)]
struct StationApiResponse<'a> {
    station: StationJson<'a>,
    latest: Option<ReadingJson>,
    heatmap: HeatmapJson,
}

// Requests are served one at a time; each selection is its own pass.
pub fn run_server(ctx: &dashboard::AppContext, styles: &drawing::Styles, port: &str) -> result::BikeDashResult<()> {
    let addr = format!("0.0.0.0:{}", port);
    let server = tiny_http::Server::http(&addr).map_err(|err| {
        result::make_error(&format!("Couldn't listen on {}: {}", addr, err))
    })?;

    info!("Serving dashboard on http://{}/", addr);
    for request in server.incoming_requests() {
        debug!("{} {}", request.method(), request.url());
        let page = route(ctx, styles, request.method(), request.url());

        let response = tiny_http::Response::from_data(page.body)
            .with_status_code(page.status)
            .with_header(content_type_header(page.content_type));
        if let Err(err) = request.respond(response) {
            warn!("Failed to send response: {}", err);
        }
    }

    return Ok(());
}

fn content_type_header(content_type: &str) -> tiny_http::Header {
    return tiny_http::Header::from_bytes(&b"Content-Type"[..], content_type.as_bytes())
        .expect("static content type");
}

pub fn route(ctx: &dashboard::AppContext, styles: &drawing::Styles, method: &tiny_http::Method, url: &str) -> Page {
    if *method != tiny_http::Method::Get {
        return text_page(405, "Method not allowed");
    }

    let path = url.split('?').next().unwrap_or("/");
    let station = query_param(url, "station").filter(|s| !s.is_empty());

    match path {
        "/" => {
            return Page{
                status: 200,
                content_type: "text/html; charset=utf-8",
                body: render_page(ctx, styles, station.as_ref().map(String::as_str)).into_bytes(),
            };
        },
        "/api/station" => {
            return api_station(ctx, station.as_ref().map(String::as_str));
        },
        _ => {
            return Page{
                status: 404,
                content_type: "text/html; charset=utf-8",
                body: "<h1>404</h1><p>Not found!<p>".as_bytes().to_vec(),
            };
        },
    }
}

fn text_page(status: u16, text: &str) -> Page {
    return Page{
        status: status,
        content_type: "text/plain; charset=utf-8",
        body: text.as_bytes().to_vec(),
    };
}

fn query_param(url: &str, key: &str) -> Option<String> {
    let query = url.splitn(2, '?').nth(1)?;

    for (k, v) in querystring::querify(query) {
        if k == key {
            // Form submissions encode spaces as '+'.
            return urlencoding::decode(&v.replace('+', " ")).ok().map(|v| v.into_owned());
        }
    }

    return None;
}

fn render_page(ctx: &dashboard::AppContext, styles: &drawing::Styles, selection: Option<&str>) -> String {
    let mut body = String::from(
        "<html><head><title>Bike Dock Occupancy</title></head><body><h1>Bike Dock Occupancy</h1>");

    body.push_str("<form method='get' action='/'><select name='station' onchange='this.form.submit()'>");
    body.push_str(&format!("<option value='' disabled hidden{}>Select a station...</option>",
                           if selection.is_none() { " selected" } else { "" }));
    for station in &ctx.stations {
        let selected = if selection == Some(station.name.as_str()) { " selected" } else { "" };
        body.push_str(&format!("<option value='{}'{}>{}</option>",
                               html_escape::encode_single_quoted_attribute(&station.name),
                               selected,
                               html_escape::encode_text(&station.name)));
    }
    body.push_str("</select> <noscript><input type='submit' value='Show' /></noscript></form>");

    if let Some(name) = selection {
        match render_station(ctx, styles, name) {
            Ok(html) => body.push_str(&html),
            Err(err) => {
                error!("Failed to render '{}': {}", name, err);
                body.push_str(&format!("<div class='error' style='color: #b00020;'><h2>Error</h2><p>{}</p></div>",
                                       html_escape::encode_text(&err.to_string())));
            },
        }
    }

    body.push_str("</body></html>");
    return body;
}

fn render_station(ctx: &dashboard::AppContext, styles: &drawing::Styles, name: &str) -> result::BikeDashResult<String> {
    let view = dashboard::load_station_view(ctx, name)?;
    let imgbuf = drawing::generate_image(&view, styles)?;
    let png = drawing::encode_png(&imgbuf)?;

    return Ok(format!(
        "<div><h2>{}</h2><div>Terminal {} ({:.5}, {:.5})</div><img alt='Station overview' src='data:image/png;base64,{}' /></div>",
        html_escape::encode_text(&view.station.name),
        html_escape::encode_text(&view.station.id),
        view.station.lat,
        view.station.lon,
        base64::engine::general_purpose::STANDARD.encode(&png)));
}

fn api_station(ctx: &dashboard::AppContext, selection: Option<&str>) -> Page {
    let name = match selection {
        Some(name) => name,
        None => return json_error(400, "missing 'station' parameter"),
    };

    if ctx.find_station(name).is_none() {
        return json_error(404, &format!("unknown station '{}'", name));
    }

    match station_json(ctx, name) {
        Ok(body) => {
            return Page{
                status: 200,
                content_type: "application/json",
                body: body,
            };
        },
        Err(err) => {
            error!("Failed to load '{}': {}", name, err);
            return json_error(500, &err.to_string());
        },
    }
}

fn station_json(ctx: &dashboard::AppContext, name: &str) -> result::BikeDashResult<Vec<u8>> {
    let view = dashboard::load_station_view(ctx, name)?;
    let grid = &view.occupancy.heatmap;

    let response = StationApiResponse{
        station: StationJson{
            name: &view.station.name,
            id: &view.station.id,
            lat: view.station.lat,
            lon: view.station.lon,
        },
        latest: view.latest.map(|r| ReadingJson{
            timestamp: r.timestamp.to_rfc3339(),
            e_bikes: r.e_bikes,
            standard_bikes: r.standard_bikes,
            empty_docks: r.empty_slots,
        }),
        heatmap: HeatmapJson{
            days: grid.day_labels(),
            times: grid.time_labels(),
            values: grid.rows().clone(),
        },
    };

    let body = serde_json::to_vec(&response).context("while encoding station json")?;
    return Ok(body);
}

fn json_error(status: u16, msg: &str) -> Page {
    let body = serde_json::json!({ "error": msg }).to_string();
    return Page{
        status: status,
        content_type: "application/json",
        body: body.into_bytes(),
    };
}

#[cfg(test)]
mod tests {
    fn station(name: &str, id: &str) -> crate::stations::Station {
        return crate::stations::Station{
            name: name.to_string(),
            id: id.to_string(),
            lat: 51.5,
            lon: -0.1,
        };
    }

    fn context(conn_str: &str) -> crate::dashboard::AppContext {
        return crate::dashboard::AppContext::new(
            crate::config::Config{
                conn_str: conn_str.to_string(),
                feed_url: "http://feed".to_string(),
                timezone: chrono_tz::UTC,
            },
            vec![
                station("River Street , Clerkenwell", "001023"),
                station("Baker's <Yard>", "001024"),
            ]);
    }

    fn styles() -> crate::drawing::Styles {
        let mut styles = crate::drawing::Styles::new(None).expect("styles");
        styles.font = None;
        styles.font_bold = None;
        return styles;
    }

    // Writes a readings database to a temp file, returning its path.
    fn readings_db(name: &str, count: usize) -> String {
        let path = std::env::temp_dir().join(format!("bikedash-{}-{}.db", name, std::process::id()));
        let _ = std::fs::remove_file(&path);

        let conn = rusqlite::Connection::open(&path).expect("open");
        conn.execute_batch("
            CREATE TABLE livecyclehireupdates (
                terminal_name TEXT, last_update TEXT,
                nb_ebikes INTEGER, nb_standard_bikes INTEGER, nb_empty_docks INTEGER);")
            .expect("create table");
        for i in 0..count {
            conn.execute(
                "INSERT INTO livecyclehireupdates VALUES ('001023', ?1, ?2, 3, 4)",
                rusqlite::params![format!("2024-07-01 {:02}:00:00", i), i as i64]).expect("insert");
        }
        conn.close().expect("close");

        return path.to_string_lossy().to_string();
    }

    fn body(page: &super::Page) -> String {
        return String::from_utf8(page.body.clone()).expect("utf8");
    }

    #[test]
    fn query_params() {
        assert_eq!(Some("River Street , Clerkenwell".to_string()),
                   super::query_param("/?station=River+Street+%2C+Clerkenwell", "station"));
        assert_eq!(Some("".to_string()), super::query_param("/?station=", "station"));
        assert_eq!(None, super::query_param("/?other=1", "station"));
        assert_eq!(None, super::query_param("/", "station"));
    }

    #[test]
    fn picker_without_selection() {
        let page = super::route(&context(":memory:"), &styles(), &tiny_http::Method::Get, "/");
        let html = body(&page);

        assert_eq!(200, page.status);
        assert!(html.contains("<option value='' disabled hidden selected>Select a station...</option>"));
        assert!(html.contains("<option value='River Street , Clerkenwell'>"));
        assert!(html.contains("Baker's &lt;Yard&gt;</option>"));
        assert!(!html.contains("<img"));
        assert!(!html.contains("class='error'"));
    }

    #[test]
    fn store_failure_shows_error() {
        let ctx = context("/nonexistent/dir/readings.db");
        let page = super::route(&ctx, &styles(), &tiny_http::Method::Get, "/?station=River+Street+%2C+Clerkenwell");
        let html = body(&page);

        assert!(html.contains("class='error'"));
        assert!(html.contains("Store unavailable"));
        assert!(!html.contains("<img"));
    }

    #[test]
    fn selection_renders_dashboard() {
        let ctx = context(&readings_db("page", 12));
        let page = super::route(&ctx, &styles(), &tiny_http::Method::Get, "/?station=River+Street+%2C+Clerkenwell");
        let html = body(&page);

        assert!(html.contains("<option value='River Street , Clerkenwell' selected>"));
        assert!(html.contains("Terminal 001023"));
        assert!(html.contains("src='data:image/png;base64,"));
    }

    #[test]
    fn api_station_json() {
        let ctx = context(&readings_db("api", 12));
        let page = super::route(&ctx, &styles(), &tiny_http::Method::Get, "/api/station?station=River+Street+%2C+Clerkenwell");
        assert_eq!(200, page.status);

        let json: serde_json::Value = serde_json::from_slice(&page.body).expect("json");
        assert_eq!("001023", json["station"]["id"]);
        assert_eq!(11, json["latest"]["e_bikes"]);
        assert_eq!(4, json["latest"]["empty_docks"]);
        assert_eq!("Monday", json["heatmap"]["days"][0]);
        assert_eq!("23:45", json["heatmap"]["times"][95]);
        // Two visible readings: 10:00 (10 + 3) and 11:00 (11 + 3) on a Monday.
        assert_eq!(13.0, json["heatmap"]["values"][0][40]);
        assert_eq!(14.0, json["heatmap"]["values"][0][44]);
    }

    #[test]
    fn api_errors() {
        let ctx = context(":memory:");
        assert_eq!(400, super::route(&ctx, &styles(), &tiny_http::Method::Get, "/api/station").status);
        assert_eq!(404, super::route(&ctx, &styles(), &tiny_http::Method::Get, "/api/station?station=Nowhere").status);
        assert_eq!(404, super::route(&ctx, &styles(), &tiny_http::Method::Get, "/favicon.ico").status);
        assert_eq!(405, super::route(&ctx, &styles(), &tiny_http::Method::Post, "/").status);
    }
}
