use crate::OutputFormat;
use anyhow::Result;
use colored::Colorize;
use geoquery_arcgis::to_geojson;
use geoquery_core::FeatureCollection;
use geoquery_query::ExecutionResult;
use serde_json::Value;

/// Features shown in pretty mode before the listing is cut short.
const PRETTY_FEATURE_LIMIT: usize = 25;

/// A command's result: its JSON rendering plus the feature set, when there is one.
pub struct CommandOutput {
    value: Value,
    collection: Option<FeatureCollection>,
}

impl CommandOutput {
    pub fn value(value: Value) -> Self {
        Self {
            value,
            collection: None,
        }
    }

    pub fn collection(collection: FeatureCollection) -> Result<Self> {
        Ok(Self {
            value: serde_json::to_value(&collection)?,
            collection: Some(collection),
        })
    }

    pub fn execution(result: ExecutionResult) -> Result<Self> {
        let value = serde_json::to_value(&result)?;
        let collection = match result {
            ExecutionResult::Features(features) => Some(features.collection),
            ExecutionResult::Scalar(_) => None,
        };
        Ok(Self { value, collection })
    }
}

pub fn print_output(format: OutputFormat, output: &CommandOutput) -> Result<()> {
    match format {
        OutputFormat::Json => {
            println!("{}", serde_json::to_string_pretty(&output.value)?);
        }
        OutputFormat::Geojson => {
            // Results without features have no GeoJSON form.
            let value = match &output.collection {
                Some(collection) => to_geojson(collection),
                None => output.value.clone(),
            };
            println!("{}", serde_json::to_string_pretty(&value)?);
        }
        OutputFormat::Pretty => match &output.collection {
            Some(collection) => print_collection(collection, &output.value)?,
            None => print_pretty(&output.value)?,
        },
    }
    Ok(())
}

fn print_collection(collection: &FeatureCollection, value: &Value) -> Result<()> {
    // Execution results carry the translated query alongside the features.
    if let Value::Object(map) = value {
        for key in ["query", "explanation", "confidence"] {
            if let Some(val) = map.get(key) {
                print_entry(key, val)?;
            }
        }
    }

    println!(
        "{} {} ({} page{})",
        "Features:".cyan().bold(),
        collection.len().to_string().yellow(),
        collection.pages_fetched,
        if collection.pages_fetched == 1 { "" } else { "s" }
    );
    if collection.is_partial() {
        println!(
            "{}",
            "Result truncated by the page cap; more features exist".red()
        );
    }

    for (i, feature) in collection.features.iter().take(PRETTY_FEATURE_LIMIT).enumerate() {
        println!("\n{}{}:", "Feature ".cyan(), (i + 1).to_string().yellow());
        print_pretty(&Value::Object(feature.attributes.clone()))?;
    }
    if collection.len() > PRETTY_FEATURE_LIMIT {
        println!(
            "\n... {} more (use --output json for the full set)",
            collection.len() - PRETTY_FEATURE_LIMIT
        );
    }
    Ok(())
}

fn print_entry(key: &str, val: &Value) -> Result<()> {
    let key_colored = key.cyan().bold();
    match val {
        Value::String(s) => println!("{}: {}", key_colored, s.green()),
        Value::Number(n) => println!("{}: {}", key_colored, n.to_string().yellow()),
        Value::Bool(b) => {
            let val_colored = if *b { "true".green() } else { "false".red() };
            println!("{}: {}", key_colored, val_colored);
        }
        Value::Null => println!("{}: {}", key_colored, "null".dimmed()),
        Value::Array(_) | Value::Object(_) => {
            println!("{}: {}", key_colored, serde_json::to_string(val)?)
        }
    }
    Ok(())
}

fn print_pretty(value: &Value) -> Result<()> {
    match value {
        Value::Object(map) => {
            for (key, val) in map {
                match val {
                    Value::Array(items) if items.iter().any(Value::is_object) => {
                        println!("{}:", key.cyan().bold());
                        print_pretty(val)?;
                    }
                    _ => print_entry(key, val)?,
                }
            }
        }
        Value::Array(arr) => {
            for (i, item) in arr.iter().enumerate() {
                println!("\n{}{}:", "Item ".cyan(), (i + 1).to_string().yellow());
                print_pretty(item)?;
            }
        }
        _ => {
            println!("{}", serde_json::to_string_pretty(value)?);
        }
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use geoquery_core::Feature;
    use serde_json::{json, Map};

    #[test]
    fn test_collection_output_keeps_features() {
        let mut attributes = Map::new();
        attributes.insert("NAME".to_string(), json!("Travis"));
        let collection = FeatureCollection {
            features: vec![Feature::new(attributes)],
            pages_fetched: 1,
            ..Default::default()
        };

        let output = CommandOutput::collection(collection).unwrap();
        assert_eq!(output.value["features"][0]["attributes"]["NAME"], "Travis");
        assert_eq!(output.collection.as_ref().map(|c| c.len()), Some(1));
    }
}
