use std::fs::File;
use std::io::{BufWriter, Write};

use common_kafka::config::KafkaConfig;
use common_kafka::kafka_producer::{create_kafka_producer, send_iter_to_kafka};
use envconfig::Envconfig;
use profile_ingest_rs::types::{Field, RawEvent};
use rand::{seq::SliceRandom, Rng};
use uuid::Uuid;

const INDIAN_CITY_STATE: [(&str, &str); 6] = [
    ("Mumbai", "Maharashtra"),
    ("Delhi", "Delhi"),
    ("Bengaluru", "Karnataka"),
    ("Chennai", "Tamil Nadu"),
    ("Kolkata", "West Bengal"),
    ("Pune", "Maharashtra"),
];

const USA_CITY_STATE: [(&str, &str); 6] = [
    ("New York", "NY"),
    ("Los Angeles", "CA"),
    ("Chicago", "IL"),
    ("Houston", "TX"),
    ("San Francisco", "CA"),
    ("Seattle", "WA"),
];

const FIRST_NAMES: [&str; 8] = [
    "Aarav", "Priya", "Rohan", "Ananya", "James", "Emily", "Michael", "Sofia",
];

const LAST_NAMES: [&str; 8] = [
    "Sharma", "Patel", "Iyer", "Khan", "Smith", "Johnson", "Garcia", "Lee",
];

#[derive(Envconfig)]
struct GeneratorConfig {
    #[envconfig(nested = true)]
    kafka: KafkaConfig,

    #[envconfig(default = "user_profiles")]
    topic: String,

    #[envconfig(default = "100000")]
    count: usize,

    // When set, write newline-delimited JSON to this file instead of
    // producing to Kafka.
    #[envconfig(default = "")]
    output_path: String,

    // Fraction of records generated with missing or unsafe partition
    // fields, to exercise the consumer's defaulting and sanitization.
    #[envconfig(default = "0.1")]
    dirty_fraction: f64,
}

fn generate_user_record(rng: &mut impl Rng) -> RawEvent {
    let (country, (city, state)) = if rng.gen_bool(0.5) {
        ("India", *INDIAN_CITY_STATE.choose(rng).unwrap())
    } else {
        ("USA", *USA_CITY_STATE.choose(rng).unwrap())
    };

    let firstname = *FIRST_NAMES.choose(rng).unwrap();
    let lastname = *LAST_NAMES.choose(rng).unwrap();

    RawEvent {
        id: Field::present(Uuid::new_v4().to_string()),
        firstname: Field::present(firstname),
        lastname: Field::present(lastname),
        email: Field::present(format!(
            "{}.{}{}@example.com",
            firstname.to_lowercase(),
            lastname.to_lowercase(),
            rng.gen_range(1..1000)
        )),
        phone: Field::present(format!("+{}", rng.gen_range(10_000_000_000u64..100_000_000_000))),
        dob: Field::present(format!(
            "{:04}-{:02}-{:02}",
            rng.gen_range(1994..=2004),
            rng.gen_range(1..=12),
            rng.gen_range(1..=28)
        )),
        address: Field::present(format!("{} Main Street, {}", rng.gen_range(1..9999), city)),
        city: Field::present(city),
        state: Field::present(state),
        zipcode: Field::present(format!("{:06}", rng.gen_range(10000..999999))),
        country: Field::present(country),
    }
}

// Knock out or dirty the partition fields on a slice of records so the
// consumer's normalization path gets real work.
fn make_dirty(mut event: RawEvent, rng: &mut impl Rng) -> RawEvent {
    match rng.gen_range(0..4) {
        0 => event.state = Field::Absent,
        1 => {
            event.country = Field::Absent;
            event.state = Field::Absent;
            event.city = Field::Absent;
        }
        2 => {
            if let Field::Present(city) = event.city.clone() {
                event.city = Field::present(format!("{city}!"));
            }
        }
        _ => {
            event.country = Field::present("U.S.A. / west");
        }
    }
    event
}

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    let config = GeneratorConfig::init_from_env()?;
    let mut rng = rand::thread_rng();

    let mut events = Vec::with_capacity(config.count);
    for _ in 0..config.count {
        let event = generate_user_record(&mut rng);
        let event = if rng.gen_bool(config.dirty_fraction) {
            make_dirty(event, &mut rng)
        } else {
            event
        };
        events.push(event);
    }

    if !config.output_path.is_empty() {
        let mut out = BufWriter::new(File::create(&config.output_path)?);
        for event in &events {
            serde_json::to_writer(&mut out, event)?;
            out.write_all(b"\n")?;
        }
        out.flush()?;
        println!(
            "Wrote {} records to {}",
            events.len(),
            config.output_path
        );
        return Ok(());
    }

    let producer = create_kafka_producer(&config.kafka).await?;
    let mut sent = 0;
    for chunk in events.chunks(10_000) {
        let results = send_iter_to_kafka(
            &producer,
            &config.topic,
            |event| event.id.clone().into_option(),
            chunk.to_vec(),
        )
        .await;
        for result in results {
            result?;
        }
        sent += chunk.len();
        println!("Sent {} events", sent);
    }

    Ok(())
}
