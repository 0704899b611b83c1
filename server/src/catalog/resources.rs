use std::fmt::Write;

use serde_json::{json, Value};

use super::{ResourceDefinition, TemplateDefinition, SERVER_NAME, SERVER_VERSION};

const TEXT: &str = "text/plain";

const ANIMALS: &[(&str, &str)] = &[
    (
        "dolphin",
        "Dolphins are highly intelligent marine mammals found in oceans worldwide. They \
         navigate and hunt by echolocation, live in social pods, and communicate with \
         clicks and whistles.",
    ),
    (
        "elephant",
        "Elephants are the largest land animals on Earth. They live in matriarchal herds \
         across Africa and Asia, use their trunks for feeding and greeting, and are known \
         for long memories.",
    ),
    (
        "lion",
        "Lions are large social cats of the African savanna, with a small population in \
         India's Gir Forest. Prides of related females hunt together while males defend \
         the territory.",
    ),
    (
        "cloudwhale",
        "Cloudwhales are fictional sky-dwelling giants that drift with the jet streams, \
         feeding on condensed vapor and singing in frequencies too low for humans to hear.",
    ),
];

const FACT_CATEGORIES: &[&str] = &[
    "habitat",
    "diet",
    "behavior",
    "conservation",
    "physical",
    "reproduction",
];

/// Six entries per species, one per category, in `FACT_CATEGORIES` order
const FACTS: &[(&str, [&str; 6])] = &[
    (
        "dolphin",
        [
            "Dolphins live in oceans and seas around the world, preferring warm, tropical waters.",
            "Dolphins are carnivores, feeding primarily on fish, squid, and crustaceans.",
            "Dolphins are highly social animals, living in groups called pods.",
            "Many dolphin species are threatened by pollution, fishing nets, and habitat loss.",
            "Dolphins have streamlined bodies, a distinctive beak, and a dorsal fin.",
            "Dolphins typically give birth to a single calf after a gestation period of 12 months.",
        ],
    ),
    (
        "elephant",
        [
            "Elephants live in savannas, grasslands, and forests across Africa and Asia.",
            "Elephants are herbivores, consuming up to 300 pounds of vegetation daily.",
            "Elephants live in matriarchal herds led by the oldest female.",
            "Elephants face threats from poaching for ivory and habitat destruction.",
            "Elephants are the largest land mammals, with distinctive trunks and tusks.",
            "Elephants have a gestation period of 22 months, the longest of any mammal.",
        ],
    ),
    (
        "lion",
        [
            "Lions primarily inhabit grasslands, savannas, and open woodlands in Africa.",
            "Lions are apex predators, hunting large ungulates like zebras and wildebeest.",
            "Lions are the only social cats, living in groups called prides.",
            "Lion populations have declined significantly due to habitat loss and human conflict.",
            "Male lions are distinguished by their manes, which darken with age.",
            "Lions typically give birth to 2-4 cubs after a gestation period of 4 months.",
        ],
    ),
    (
        "cloudwhale",
        [
            "Cloudwhales migrate through the atmospheric layers, preferring cumulus formations.",
            "Cloudwhales feed on atmospheric plankton and condensed water vapor.",
            "Cloudwhales are solitary creatures, communicating through low-frequency sky songs.",
            "Cloudwhales are endangered due to air pollution and climate change.",
            "Cloudwhales have translucent bodies and can reach lengths of up to 200 feet.",
            "Cloudwhales reproduce during storm seasons, with calves born in thunderclouds.",
        ],
    ),
];

const REPORT_LOCATIONS: &[(&str, f64, f64)] = &[
    ("providence-ri", 41.8240, -71.4128),
    ("boston-ma", 42.3601, -71.0589),
    ("new-york-ny", 40.7128, -74.0060),
    ("los-angeles-ca", 34.0522, -118.2437),
    ("chicago-il", 41.8781, -87.6298),
];

const MONTHS: [&str; 12] = [
    "January",
    "February",
    "March",
    "April",
    "May",
    "June",
    "July",
    "August",
    "September",
    "October",
    "November",
    "December",
];

pub fn list() -> Vec<ResourceDefinition> {
    let about = ResourceDefinition {
        uri: "resource://about".to_string(),
        name: "About".to_string(),
        description: "Server name, version and the animals it knows".to_string(),
        mime_type: "application/json",
    };
    let animals = ANIMALS.iter().map(|(animal, _)| {
        let title = title_case(animal);
        ResourceDefinition {
            uri: format!("animal://{}", animal),
            name: format!("{} Information", title),
            description: format!("Information about {}s", animal),
            mime_type: TEXT,
        }
    });
    std::iter::once(about).chain(animals).collect()
}

pub fn templates() -> Vec<TemplateDefinition> {
    vec![
        TemplateDefinition {
            uri_template: "animal://{animal_name}",
            name: "Animal Description",
            description: "Description of an animal: dolphin, elephant, lion or cloudwhale.",
            mime_type: TEXT,
        },
        TemplateDefinition {
            uri_template: "animal://facts/{species}/{category}",
            name: "Animal Facts",
            description: "Facts about an animal species. Categories: habitat, diet, behavior, \
                          conservation, physical, reproduction.",
            mime_type: TEXT,
        },
        TemplateDefinition {
            uri_template: "weather://report/{location}/{days}",
            name: "Weather Report",
            description: "Weather report for a location slug such as providence-ri over 1 to 14 days.",
            mime_type: TEXT,
        },
        TemplateDefinition {
            uri_template: "climate://{location}/{year}/{month}",
            name: "Climate Data",
            description: "Historical climate summary for a location slug, year (1900-2024) \
                          and month (1-12).",
            mime_type: TEXT,
        },
    ]
}

fn title_case(word: &str) -> String {
    let mut chars = word.chars();
    match chars.next() {
        Some(first) => first.to_uppercase().chain(chars.flat_map(char::to_lowercase)).collect(),
        None => String::new(),
    }
}

fn contents(uri: &str, mime_type: &str, text: String) -> Value {
    json!({
        "contents": [{ "uri": uri, "mimeType": mime_type, "text": text }]
    })
}

fn failure(message: String) -> Value {
    json!({ "error": message })
}

/// Read a resource.
///
/// Failures are reported in-band as `{"error": ...}` results so the caller
/// can relay them to the model.
pub fn read(uri: &str) -> Value {
    let Some((scheme, path)) = uri.split_once("://") else {
        return failure(format!("Unknown resource URI: {}", uri));
    };
    let segments: Vec<&str> = path.split('/').collect();

    let outcome = match (scheme, segments.as_slice()) {
        ("resource", ["about"]) => Ok(about()),
        ("animal", ["facts", species, category]) => Ok(contents(uri, TEXT, animal_facts(species, category))),
        ("animal", [animal]) => animal_description(animal).map(|text| contents(uri, TEXT, text)),
        ("weather", ["report", location, days]) => {
            weather_report(location, days).map(|text| contents(uri, TEXT, text))
        }
        ("climate", [location, year, month]) => {
            climate_data(location, year, month).map(|text| contents(uri, TEXT, text))
        }
        _ => Err(format!("Unknown resource URI: {}", uri)),
    };
    outcome.unwrap_or_else(failure)
}

fn about() -> Value {
    let info = json!({
        "server_name": SERVER_NAME,
        "version": SERVER_VERSION,
        "resources": ANIMALS.iter().map(|(animal, _)| *animal).collect::<Vec<_>>(),
    });
    contents("resource://about", "application/json", info.to_string())
}

fn animal_description(animal: &str) -> Result<String, String> {
    let key = animal.to_lowercase();
    ANIMALS
        .iter()
        .find(|(name, _)| *name == key)
        .map(|(_, description)| description.to_string())
        .ok_or_else(|| format!("Animal resource not found: {}", animal))
}

fn animal_facts(species: &str, category: &str) -> String {
    let species_key = species.to_lowercase();
    let category_key = category.to_lowercase();
    let fact = FACTS
        .iter()
        .find(|(name, _)| *name == species_key)
        .zip(FACT_CATEGORIES.iter().position(|c| *c == category_key))
        .map(|((_, facts), index)| facts[index].to_string())
        .unwrap_or_else(|| format!("No {} information available for {}.", category, species));
    format!("{} - {}: {}", title_case(species), title_case(category), fact)
}

fn weather_report(location: &str, days: &str) -> Result<String, String> {
    let days: u32 = days
        .parse()
        .map_err(|_| "Invalid number of days".to_string())?;
    if !(1..=14).contains(&days) {
        return Err("Days must be between 1 and 14".to_string());
    }
    let Some((_, lat, lon)) = REPORT_LOCATIONS.iter().find(|(name, _, _)| *name == location) else {
        let available: Vec<&str> = REPORT_LOCATIONS.iter().map(|(name, _, _)| *name).collect();
        return Err(format!(
            "Location '{}' not supported. Available: {}",
            location,
            available.join(", ")
        ));
    };

    let mut report = format!(
        "WEATHER REPORT for {}\nGenerated: {}\nCoordinates: {}, {}\nForecast Period: {} days\n\n{}\n",
        location.to_uppercase().replace('-', ", "),
        chrono::Utc::now().format("%Y-%m-%d %H:%M:%S UTC"),
        lat,
        lon,
        days,
        "=".repeat(50)
    );
    for i in 0..days {
        let day = match i {
            0 => "Today".to_string(),
            1 => "Tomorrow".to_string(),
            n => format!("Day {}", n + 1),
        };
        let high = 70 + (i * 2) % 20;
        let low = high - 15;
        let _ = write!(
            report,
            "\n{}:\n  High: {}°F\n  Low: {}°F\n  Conditions: Partly cloudy\n  Wind: 5-10 mph SW\n  Humidity: 65%\n",
            day, high, low
        );
    }
    Ok(report)
}

fn climate_data(location: &str, year: &str, month: &str) -> Result<String, String> {
    let (Ok(year), Ok(month)) = (year.parse::<i32>(), month.parse::<i32>()) else {
        return Err("Invalid year or month".to_string());
    };
    if !(1900..=2024).contains(&year) {
        return Err("Year must be between 1900 and 2024".to_string());
    }
    if !(1..=12).contains(&month) {
        return Err("Month must be between 1 and 12".to_string());
    }

    let avg_temp = 60 + (month - 6) * 5;
    let precipitation = 3.5 + f64::from(month % 4) * 0.5;
    Ok(format!(
        "CLIMATE DATA for {}\nPeriod: {} {}\n\n\
         Average Temperature: {}°F\n\
         Total Precipitation: {:.1} inches\n\
         Average Humidity: 68%\n\
         Prevailing Wind: SW at 8 mph\n\
         Sunny Days: {}\n\
         Cloudy Days: {}\n\n\
         Historical Context:\n\
         - This data represents typical conditions for the region\n\
         - Temperature variations of ±5°F are common\n\
         - Precipitation patterns may vary significantly year to year\n",
        location.to_uppercase(),
        MONTHS[(month - 1) as usize],
        year,
        avg_temp,
        precipitation,
        20 + (month % 3) * 3,
        8 - (month % 3) * 2
    ))
}

#[cfg(test)]
mod tests {
    use super::*;

    fn text(result: &Value) -> &str {
        result["contents"][0]["text"].as_str().unwrap()
    }

    #[test]
    fn test_listing_has_only_concrete_uris() {
        assert!(list().iter().all(|r| !r.uri.contains('{')));
        assert!(templates().iter().all(|t| t.uri_template.contains('{')));
    }

    #[test]
    fn test_animal_facts() {
        let result = read("animal://facts/dolphin/diet");
        assert_eq!(
            text(&result),
            "Dolphin - Diet: Dolphins are carnivores, feeding primarily on fish, squid, and crustaceans."
        );
        assert_eq!(result["contents"][0]["uri"], "animal://facts/dolphin/diet");

        let unknown = read("animal://facts/unicorn/diet");
        assert_eq!(text(&unknown), "Unicorn - Diet: No diet information available for unicorn.");
    }

    #[test]
    fn test_weather_report_days() {
        let report = read("weather://report/boston-ma/3");
        let body = text(&report);
        assert!(body.starts_with("WEATHER REPORT for BOSTON, MA"));
        assert!(body.contains("Day 3:\n  High: 74°F\n  Low: 59°F"));
        assert!(!body.contains("Day 4"));

        assert_eq!(read("weather://report/boston-ma/15")["error"], "Days must be between 1 and 14");
        assert_eq!(read("weather://report/boston-ma/soon")["error"], "Invalid number of days");
        assert!(read("weather://report/paris-fr/2")["error"]
            .as_str()
            .unwrap()
            .starts_with("Location 'paris-fr' not supported"));
    }

    #[test]
    fn test_climate_data() {
        let body = read("climate://providence-ri/2020/7")["contents"][0]["text"]
            .as_str()
            .unwrap()
            .to_string();
        assert!(body.contains("Period: July 2020"));
        assert!(body.contains("Average Temperature: 65°F"));
        assert!(body.contains("Total Precipitation: 5.0 inches"));
        assert!(body.contains("Sunny Days: 23"));
        assert!(body.contains("Cloudy Days: 6"));

        assert_eq!(read("climate://providence-ri/1899/7")["error"], "Year must be between 1900 and 2024");
        assert_eq!(read("climate://providence-ri/2020/13")["error"], "Month must be between 1 and 12");
    }

    #[test]
    fn test_about_and_unknown_uris() {
        let about: Value = serde_json::from_str(text(&read("resource://about"))).unwrap();
        assert_eq!(about["resources"].as_array().unwrap().len(), 4);
        assert_eq!(read("animal://lion")["contents"][0]["mimeType"], "text/plain");
        assert_eq!(read("animal://griffin")["error"], "Animal resource not found: griffin");
        assert_eq!(read("ftp://nowhere")["error"], "Unknown resource URI: ftp://nowhere");
        assert_eq!(read("not a uri")["error"], "Unknown resource URI: not a uri");
    }
}
