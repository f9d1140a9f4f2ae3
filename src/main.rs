// sudo apt-get install fonts-roboto
//
// BIKEDASH_DB=readings.db bikedash --port 8080
// BIKEDASH_DB=readings.db bikedash --station "River Street , Clerkenwell" --save-image river.png
extern crate chrono;
extern crate chrono_tz;
extern crate flexi_logger;
extern crate getopts;
#[macro_use]
extern crate log;
#[macro_use]
extern crate serde_derive;

mod aggregate;
mod config;
mod dashboard;
mod drawing;
mod result;
mod server;
mod stations;
mod store;

fn print_usage(program: &str, opts: &getopts::Options) {
    let brief = format!("Usage: {} [--port PORT | --station NAME | --list-stations] [options]", program);
    print!("{}", opts.usage(&brief));
}

fn render_one(ctx: &dashboard::AppContext, styles: &drawing::Styles, name: &str, png_out: &str) -> result::BikeDashResult<()> {
    let view = dashboard::load_station_view(ctx, name)?;

    match view.latest {
        Some(ref latest) => info!(
            "Latest at {}: {} e-bikes, {} standard bikes, {} empty docks",
            latest.timestamp.with_timezone(&view.timezone),
            latest.e_bikes, latest.standard_bikes, latest.empty_slots),
        None => info!("No latest reading for {}", view.station.id),
    }

    let imgbuf = drawing::generate_image(&view, styles)?;
    imgbuf.save(png_out)?;
    info!("Wrote {}", png_out);

    return Ok(());
}

fn list_stations(ctx: &dashboard::AppContext) -> result::BikeDashResult<()> {
    for (station, has_history) in dashboard::stations_with_history(ctx)? {
        println!("{} {:>8} {:>10.6} {:>10.6}  {}",
                 if has_history { "*" } else { " " },
                 station.id, station.lat, station.lon, station.name);
    }
    return Ok(());
}

fn run(matches: &getopts::Matches) -> result::BikeDashResult<()> {
    let mut config = config::load_config()?;
    if let Some(tz) = matches.opt_str("timezone") {
        config.timezone = config::parse_timezone(&tz)?;
    }

    let stations = stations::list_stations(&config.feed_url)?;
    let ctx = dashboard::AppContext::new(config, stations);

    if matches.opt_present("list-stations") {
        return list_stations(&ctx);
    }

    let styles = drawing::Styles::new(matches.opt_str("font").as_ref().map(String::as_str))?;

    if let Some(name) = matches.opt_str("station") {
        let png_out = matches.opt_str("save-image").unwrap_or("station.png".to_string());
        return render_one(&ctx, &styles, &name, &png_out);
    }

    let port = matches.opt_str("port").unwrap_or("8080".to_string());
    return server::run_server(&ctx, &styles, &port);
}

fn main() {
    let args: Vec<String> = std::env::args().collect();
    let mut opts = getopts::Options::new();
    opts.optopt("p", "port", "Serve the dashboard over HTTP (default 8080).", "PORT");
    opts.optopt("s", "station", "Render one station and exit.", "NAME");
    opts.optopt("i", "save-image", "Where to put the png for --station.", "FILENAME");
    opts.optflag("l", "list-stations", "Print the station directory; * marks stations with readings.");
    opts.optopt("f", "font", "TTF font for chart labels.", "FILENAME");
    opts.optopt("z", "timezone", "Time zone for the heatmap, e.g. Europe/London.", "TZ");
    opts.optflag("", "log-to-file", "Log to a file in the working directory instead of stderr.");
    opts.optflag("h", "help", "Print this help.");

    let matches = opts.parse(&args[1..]).expect("parse opts");

    if matches.opt_present("help") {
        print_usage(&args[0], &opts);
        return;
    }

    let mut logger = flexi_logger::Logger::try_with_env_or_str("info")
        .expect("logger spec")
        .format(flexi_logger::detailed_format);
    if matches.opt_present("log-to-file") {
        logger = logger.log_to_file(flexi_logger::FileSpec::default());
    }
    let _logger = logger.start().expect("start logger");

    if let Err(err) = run(&matches) {
        error!("{}", err);
        std::process::exit(1);
    }
}
