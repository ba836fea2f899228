/// FFDB walkthrough
///
/// Builds a small parameter tree in a temporary directory, then:
/// - queries one table over a time window
/// - joins origins to their associated arrivals
/// - fetches a large result in batches
/// - prints database statistics

use ffdb::core::config::Config;
use ffdb::core::database::FFDatabase;
use ffdb::core::logging;
use ffdb::core::types::FieldValue;
use ffdb::schema::{Record, SchemaRegistry};
use ffdb::storage::FlatFileWriter;
use log::LevelFilter;

const DAY: f64 = 86400.0;
const JAN_05: f64 = 1073260800.0;

fn record(registry: &SchemaRegistry, table: &str, fields: &[(&str, FieldValue)]) -> Result<Record, Box<dyn std::error::Error>> {
    let schema = registry
        .get(table)
        .ok_or_else(|| format!("no table {}", table))?;
    let mut record = Record::new(schema);
    for (name, value) in fields {
        record.set_by_name(name, value.clone())?;
    }
    Ok(record)
}

fn main() -> Result<(), Box<dyn std::error::Error>> {
    let _ = logging::init(LevelFilter::Info);

    println!("\n╔═══════════════════════════════════════════════╗");
    println!("║        FFDB - Flat-File Query Walkthrough     ║");
    println!("╚═══════════════════════════════════════════════╝\n");

    // Step 1: Lay out a parameter tree
    let root = tempfile::tempdir()?;
    let param = root.path().join("param");
    std::fs::create_dir_all(&param)?;
    let config = Config::new(&param).with_dir_structure("%Y/%m/%d", DAY).with_author("idc");
    let db = FFDatabase::open(config)?;
    let registry = SchemaRegistry::builtin();

    println!("Step 1: Writing three days of origins, assocs and arrivals...");
    for day in 0..3 {
        let base = JAN_05 + day as f64 * DAY;
        let dir = db.partition_dir("idc", base)?;
        let orid = day as i64 + 1;
        let origin = record(&registry, "origin", &[
            ("orid", FieldValue::Integer(orid)),
            ("time", FieldValue::Time(base + 3600.0)),
            ("lat", FieldValue::Number(40.0 + day as f64)),
            ("lon", FieldValue::Number(-105.0)),
        ])?;
        FlatFileWriter::append(&dir, "ev", &[origin])?;

        let mut assocs = Vec::new();
        let mut arrivals = Vec::new();
        for (k, sta) in ["ANMO", "KONO"].iter().enumerate() {
            let arid = orid * 10 + k as i64;
            assocs.push(record(&registry, "assoc", &[
                ("arid", FieldValue::Integer(arid)),
                ("orid", FieldValue::Integer(orid)),
                ("sta", FieldValue::Text(sta.to_string())),
            ])?);
            arrivals.push(record(&registry, "arrival", &[
                ("arid", FieldValue::Integer(arid)),
                ("sta", FieldValue::Text(sta.to_string())),
                ("time", FieldValue::Time(base + 3600.0 + 60.0 * (k as f64 + 1.0))),
                ("iphase", FieldValue::Text("P".to_string())),
            ])?);
        }
        FlatFileWriter::append(&dir, "ev", &assocs)?;
        FlatFileWriter::append(&dir, "ev", &arrivals)?;
    }
    println!("  Tree under {}\n", param.display());

    // Step 2: Time window
    println!("Step 2: Origins on 2004/01/06 or later...");
    let rows = db.query_all("select * from origin where time >= '2004/01/06'", 10)?;
    for row in &rows {
        println!("  {}", row.primary);
    }
    println!();

    // Step 3: Join
    println!("Step 3: Origins with a KONO arrival within ten minutes...");
    let query = "select o.* from origin o, assoc s, arrival a \
                 where s.orid = o.orid and a.arid = s.arid and a.sta = 'KONO' and a.time <= o.time + 600";
    let mut session = db.query(query)?;
    println!("  Columns: {}", session.columns().len());
    for row in session.drain(4)? {
        let arrival = &row.joined[1];
        println!(
            "  orid {} -> arid {}",
            row.primary.get_by_name("orid").map(|v| v.to_string()).unwrap_or_default(),
            arrival.get_by_name("arid").map(|v| v.to_string()).unwrap_or_default()
        );
        if let Some(p) = row.primary.provenance() {
            println!("    from {} at byte {}", p.file.display(), p.offset);
        }
    }
    session.close()?;
    println!();

    // Step 4: Batched fetch
    println!("Step 4: Fetching arrivals one at a time...");
    let mut session = db.query("select sta, time from arrival")?;
    loop {
        let fetch = session.fetch(1)?;
        if fetch.done {
            break;
        }
        for row in fetch.rows {
            let values: Vec<String> = row.project(session.projection()).iter().map(|v| v.to_string()).collect();
            println!("  {}", values.join("  "));
        }
    }
    println!("  {} rows\n", session.fetched());

    // Step 5: Statistics
    println!("Step 5: Statistics");
    let stats = db.stats();
    println!("  {}", serde_json::to_string_pretty(&stats)?);

    Ok(())
}
