use std::{
    collections::HashMap,
    io::{self, Write},
};

use clap::{Parser, Subcommand};
use color_eyre::eyre::Context;
use tankerkoenig::{
    report::{report, Outcome},
    Area, Client, DetailedStation, PriceStatus, Station, StationPrices,
};

#[derive(clap::Parser, Debug)]
#[command(about = "Query fuel prices from the Tankerkoenig API")]
struct Args {
    #[arg(
        short = 'u',
        long = "url",
        env = "TK_BASE_URL",
        default_value = tankerkoenig::BASE_URL,
        help = "Base URL of the API"
    )]
    base_url: String,
    #[arg(
        short = 'k',
        long,
        env = "TK_API_KEY",
        default_value = tankerkoenig::DEMO_API_KEY,
        hide_default_value = true,
        help = "API key, defaults to the demo key"
    )]
    api_key: String,
    #[command(subcommand)]
    command: Option<Command>,
}

#[derive(Subcommand, Debug)]
enum Command {
    /// Request the station list of the default area and print the raw response (the default)
    Report,
    List(List),
    Prices(Prices),
    Detail(Detail),
}

/// List the stations of one or more areas
#[derive(clap::Args, Debug)]
struct List {
    #[arg(help = "Areas of the form <latitude>,<longitude>,<radius in km>")]
    areas: Vec<Area>,
}

/// Print the current prices of open stations
#[derive(clap::Args, Debug)]
struct Prices {
    #[arg(required = true, help = "Station ids")]
    ids: Vec<String>,
}

/// Print everything known about a station
#[derive(clap::Args, Debug)]
struct Detail {
    id: String,
}

fn print_station<W: Write>(out: &mut W, station: &Station) -> io::Result<()> {
    writeln!(
        out,
        "== {} - {} ({})",
        station.place.trim(),
        station.address(),
        station.post_code,
    )?;
    write!(out, "{} {}", station.brand.trim(), station.name.trim())?;
    if let Some(dist) = station.dist {
        write!(out, ", {dist} km")?;
    }
    writeln!(out, ", {}", if station.is_open { "open" } else { "closed" })?;

    writeln!(out, "Prices:")?;
    for (fuel, price) in station.prices() {
        writeln!(out, "  - {fuel}: {price}")?;
    }
    writeln!(out)
}

/// Prints the prices of open stations, in the order of `ids`.
fn print_prices<W: Write>(
    out: &mut W,
    ids: &[String],
    prices: &HashMap<String, StationPrices>,
) -> io::Result<()> {
    for id in ids {
        match prices.get(id) {
            None => log::warn!("no prices returned for {id}"),
            Some(p) if p.status != PriceStatus::Open => {
                log::info!("skipping {id}: {:?}", p.status)
            }
            Some(p) => {
                writeln!(out, "== {id}")?;
                for (fuel, price) in p.prices() {
                    writeln!(out, "  - {fuel}: {price}")?;
                }
                writeln!(out)?;
            }
        }
    }

    Ok(())
}

fn print_detail<W: Write>(out: &mut W, station: &DetailedStation) -> io::Result<()> {
    print_station(out, &station.station)?;

    writeln!(out, "Opening times:")?;
    if station.whole_day {
        writeln!(out, "  - open 24/24")?;
    }
    for time in &station.opening_times {
        writeln!(out, "  - {}: {} - {}", time.text, time.start, time.end)?;
    }
    for time in &station.override_opening_times {
        writeln!(out, "  - {time}")?;
    }
    if let Some(state) = &station.state {
        writeln!(out, "State: {state}")?;
    }

    Ok(())
}

fn report_main(client: &Client) -> color_eyre::Result<()> {
    let url = client.list_url(&Area::default());

    let mut stdout = io::stdout().lock();
    let outcome = report(client, &url, &mut stdout).wrap_err("could not write report")?;
    stdout.flush()?;

    if outcome != Outcome::Accepted {
        log::info!("report did not succeed: {outcome:?}");
    }

    Ok(())
}

impl List {
    fn main(self, client: &Client) -> color_eyre::Result<()> {
        let areas = match self.areas.is_empty() {
            true => vec![Area::default()],
            false => self.areas,
        };

        let stations = client
            .list_areas(&areas)
            .wrap_err("could not list stations")?;

        let mut stdout = io::stdout().lock();
        for station in &stations {
            print_station(&mut stdout, station)?;
        }
        Ok(())
    }
}

impl Prices {
    fn main(self, client: &Client) -> color_eyre::Result<()> {
        let prices = client
            .prices(&self.ids)
            .wrap_err("could not fetch prices")?;

        print_prices(&mut io::stdout().lock(), &self.ids, &prices)?;
        Ok(())
    }
}

impl Detail {
    fn main(self, client: &Client) -> color_eyre::Result<()> {
        let detail = client
            .detail(&self.id)
            .wrap_err("could not fetch station")?;

        let Some(station) = detail.station else {
            color_eyre::eyre::bail!("No station with id {}", self.id)
        };

        print_detail(&mut io::stdout().lock(), &station)?;
        Ok(())
    }
}

fn main() -> color_eyre::Result<()> {
    color_eyre::install()?;
    env_logger::init();
    let args = Args::parse();

    let client = Client::with_options()
        .base_url(args.base_url)
        .api_key(args.api_key)
        .build();

    match args.command.unwrap_or(Command::Report) {
        Command::Report => report_main(&client),
        Command::List(l) => l.main(&client),
        Command::Prices(p) => p.main(&client),
        Command::Detail(d) => d.main(&client),
    }
}

#[cfg(test)]
mod test {
    use clap::Parser;
    use tankerkoenig::OpeningTime;

    use super::*;

    fn printed<F>(f: F) -> Vec<String>
    where
        F: FnOnce(&mut Vec<u8>) -> io::Result<()>,
    {
        let mut out = Vec::new();
        f(&mut out).unwrap();
        String::from_utf8(out)
            .unwrap()
            .lines()
            .map(String::from)
            .collect()
    }

    fn station() -> Station {
        Station {
            id: "474e5046-deaf-4f9b-9a32-9797b778f047".into(),
            name: "TOTAL BERLIN".into(),
            brand: "TOTAL".into(),
            street: "MARGARETE-SOMMER-STR.".into(),
            house_number: Some("2".into()),
            post_code: "10407".into(),
            place: "BERLIN".into(),
            dist: Some(1.1),
            diesel: Some(1.109),
            e5: Some(1.339),
            is_open: true,
            ..Default::default()
        }
    }

    #[test]
    fn station_layout() {
        let lines = printed(|out| print_station(out, &station()));

        assert_eq!(
            lines,
            vec![
                "== BERLIN - MARGARETE-SOMMER-STR. 2 (10407)",
                "TOTAL TOTAL BERLIN, 1.1 km, open",
                "Prices:",
                "  - Diesel: 1.109",
                "  - Super E5: 1.339",
                "",
            ]
        );
    }

    #[test]
    fn only_open_prices_are_printed() {
        let prices = HashMap::from([
            (
                "open".to_owned(),
                StationPrices {
                    status: PriceStatus::Open,
                    e10: Some(1.659),
                    ..Default::default()
                },
            ),
            (
                "closed".to_owned(),
                StationPrices {
                    status: PriceStatus::Closed,
                    diesel: Some(1.5),
                    ..Default::default()
                },
            ),
            (
                "empty".to_owned(),
                StationPrices {
                    status: PriceStatus::NoPrices,
                    ..Default::default()
                },
            ),
        ]);
        let ids: Vec<String> = ["closed", "missing", "open", "empty"]
            .into_iter()
            .map(String::from)
            .collect();

        let lines = printed(|out| print_prices(out, &ids, &prices));

        assert_eq!(lines, vec!["== open", "  - Super E10: 1.659", ""]);
    }

    #[test]
    fn detail_layout() {
        let detail = DetailedStation {
            station: Station {
                dist: None,
                is_open: false,
                ..station()
            },
            opening_times: vec![OpeningTime {
                text: "Mo-Fr".into(),
                start: "06:00:00".into(),
                end: "22:00:00".into(),
            }],
            override_opening_times: vec!["closed on 24.12.".into()],
            whole_day: true,
            state: Some("BE".into()),
        };

        let lines = printed(|out| print_detail(out, &detail));

        assert_eq!(
            lines,
            vec![
                "== BERLIN - MARGARETE-SOMMER-STR. 2 (10407)",
                "TOTAL TOTAL BERLIN, closed",
                "Prices:",
                "  - Diesel: 1.109",
                "  - Super E5: 1.339",
                "",
                "Opening times:",
                "  - open 24/24",
                "  - Mo-Fr: 06:00:00 - 22:00:00",
                "  - closed on 24.12.",
                "State: BE",
            ]
        );
    }

    #[test]
    fn detail_without_state() {
        let detail = DetailedStation {
            station: station(),
            opening_times: Vec::new(),
            override_opening_times: Vec::new(),
            whole_day: false,
            state: None,
        };

        let lines = printed(|out| print_detail(out, &detail));

        assert_eq!(lines.last().map(String::as_str), Some("Opening times:"));
    }

    #[test]
    fn defaults_to_report() {
        let args = Args::try_parse_from(["tankerkoenig"]).unwrap();

        assert!(args.command.is_none());
        assert_eq!(args.base_url, tankerkoenig::BASE_URL);
    }

    #[test]
    fn areas_are_parsed() {
        let args =
            Args::try_parse_from(["tankerkoenig", "list", "52.52,13.4,5", "48.1,11.5,2"]).unwrap();

        let Some(Command::List(list)) = args.command else {
            panic!("expected the list command")
        };
        assert_eq!(list.areas.len(), 2);
        assert_eq!(list.areas[1].radius, 2.0);
    }

    #[test]
    fn invalid_area_is_rejected() {
        assert!(Args::try_parse_from(["tankerkoenig", "list", "52.52,13.4,50"]).is_err());
        assert!(Args::try_parse_from(["tankerkoenig", "list", "52.52"]).is_err());
    }

    #[test]
    fn prices_need_ids() {
        assert!(Args::try_parse_from(["tankerkoenig", "prices"]).is_err());

        let args = Args::try_parse_from(["tankerkoenig", "-k", "key", "prices", "a", "b"]).unwrap();
        assert_eq!(args.api_key, "key");
    }
}
