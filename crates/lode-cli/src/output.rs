//! Diff renderers, selected by name with `--output-format`.

use std::io::Write;

use colored::Colorize;
use lode_diff::{diff_meta_text, DiffLine, MetaDelta};
use lode_sdk::{
    CoordinateTransform, DatasetDiff, Delta, DiffOutput, DiffWriter, ItemKey, SdkError, SdkResult,
};
use serde_json::{json, Map, Value};

type Constructor = fn(Box<dyn Write>) -> Box<dyn DiffOutput>;

const DIFF_FORMATS: &[(&str, Constructor)] = &[
    ("quiet", quiet),
    ("text", text),
    ("json", json_doc),
    ("json-lines", json_lines),
];

fn quiet(_: Box<dyn Write>) -> Box<dyn DiffOutput> {
    Box::new(QuietOutput)
}

fn text(out: Box<dyn Write>) -> Box<dyn DiffOutput> {
    Box::new(TextOutput { out })
}

fn json_doc(out: Box<dyn Write>) -> Box<dyn DiffOutput> {
    Box::new(JsonOutput {
        out,
        header: None,
        datasets: Map::new(),
    })
}

fn json_lines(out: Box<dyn Write>) -> Box<dyn DiffOutput> {
    Box::new(JsonLinesOutput { out, started: false })
}

/// The renderer registered as `format`.
pub fn diff_output(format: &str, out: Box<dyn Write>) -> SdkResult<Box<dyn DiffOutput>> {
    DIFF_FORMATS
        .iter()
        .find(|(name, _)| *name == format)
        .map(|(_, make)| make(out))
        .ok_or_else(|| SdkError::Usage(format!("Unrecognized output format: {format}")))
}

/// The renderer for `--only-feature-count` in `format`.
pub fn feature_count_output(format: &str, out: Box<dyn Write>) -> SdkResult<Box<dyn DiffOutput>> {
    let json = match format {
        "text" => false,
        "json" => true,
        other => {
            return Err(SdkError::Usage(format!(
                "Unrecognized output format for feature counts: {other}"
            )))
        }
    };
    Ok(Box::new(FeatureCountOutput {
        out,
        json,
        counts: Vec::new(),
    }))
}

/// Item values ready to render: dereferenced and, with `--crs`,
/// reprojected.
struct ItemValues {
    geometry_column: Option<String>,
    old_transform: Option<CoordinateTransform>,
    new_transform: Option<CoordinateTransform>,
}

impl ItemValues {
    fn new(writer: &DiffWriter<'_>, ds_path: &str, ds_diff: &DatasetDiff) -> SdkResult<Self> {
        let geometry_column = match writer.old_or_new_dataset(ds_path) {
            Some(ds) => ds
                .schema()?
                .and_then(|schema| schema.geometry_column().map(|c| c.name.clone())),
            None => None,
        };
        let (old_transform, new_transform) = writer.get_geometry_transforms(ds_path, ds_diff)?;
        Ok(Self {
            geometry_column,
            old_transform,
            new_transform,
        })
    }

    fn old_and_new(&self, delta: &Delta) -> SdkResult<(Option<Value>, Option<Value>)> {
        let old = delta.old().map(|v| v.value().cloned()).transpose()?;
        let new = delta.new_value().map(|v| v.value().cloned()).transpose()?;
        Ok((
            self.reproject(old, self.old_transform.as_ref())?,
            self.reproject(new, self.new_transform.as_ref())?,
        ))
    }

    fn reproject(&self, value: Option<Value>, transform: Option<&CoordinateTransform>) -> SdkResult<Option<Value>> {
        let (Some(column), Some(transform)) = (&self.geometry_column, transform) else {
            return Ok(value);
        };
        let Some(mut value) = value else {
            return Ok(None);
        };
        if let Some(Value::String(wkt)) = value.get(column) {
            let projected = transform.transform_wkt(wkt)?;
            value[column.as_str()] = Value::String(projected);
        }
        Ok(Some(value))
    }
}

fn item_type_of(writer: &DiffWriter<'_>, ds_path: &str) -> &'static str {
    writer
        .old_or_new_dataset(ds_path)
        .map(|ds| ds.item_type())
        .unwrap_or("feature")
}

fn change_json(old: Option<Value>, new: Option<Value>) -> Value {
    let mut change = Map::new();
    if let Some(old) = old {
        change.insert("-".into(), old);
    }
    if let Some(new) = new {
        change.insert("+".into(), new);
    }
    Value::Object(change)
}

fn commit_json(writer: &DiffWriter<'_>) -> SdkResult<Option<Value>> {
    let (Some(id), Some(commit)) = (writer.target().commit(), writer.target_commit()?) else {
        return Ok(None);
    };
    Ok(Some(json!({
        "commit": id.to_string(),
        "parents": commit.parents.iter().map(ToString::to_string).collect::<Vec<_>>(),
        "author": commit.author,
        "timestamp": commit.timestamp_ms,
        "message": commit.message,
    })))
}

fn io_err(e: serde_json::Error) -> SdkError {
    SdkError::Io(e.into())
}

pub struct QuietOutput;

impl DiffOutput for QuietOutput {
    fn write_ds_diff(&mut self, _: &DiffWriter<'_>, _: &str, _: &DatasetDiff) -> SdkResult<()> {
        Ok(())
    }

    fn wants_deltas(&self) -> bool {
        false
    }
}

/// Unified-diff style text.
pub struct TextOutput {
    out: Box<dyn Write>,
}

impl TextOutput {
    fn write_meta(&mut self, ds_path: &str, name: &str, delta: &MetaDelta) -> SdkResult<()> {
        let label = format!("{ds_path}:meta:{name}");
        self.write_headers(&label, delta.old.is_some(), delta.new.is_some())?;
        let as_text = |v: &Option<Value>| match v {
            None => Some(None),
            Some(Value::String(s)) => Some(Some(s.clone())),
            Some(_) => None,
        };
        if let (Some(old), Some(new)) = (as_text(&delta.old), as_text(&delta.new)) {
            for hunk in diff_meta_text(old.as_deref(), new.as_deref(), 3) {
                writeln!(self.out, "{}", format!("@@ -{} +{} @@", hunk.old_start, hunk.new_start).cyan())?;
                for line in hunk.lines {
                    match line {
                        DiffLine::Context(l) => writeln!(self.out, "  {l}")?,
                        DiffLine::Removed(l) => writeln!(self.out, "{}", format!("- {l}").red())?,
                        DiffLine::Added(l) => writeln!(self.out, "{}", format!("+ {l}").green())?,
                    }
                }
            }
            return Ok(());
        }
        for (sign, value) in [("-", &delta.old), ("+", &delta.new)] {
            let Some(value) = value else { continue };
            let pretty = serde_json::to_string_pretty(value).map_err(io_err)?;
            for line in pretty.lines() {
                self.write_signed(sign, line)?;
            }
        }
        Ok(())
    }

    fn write_headers(&mut self, label: &str, old: bool, new: bool) -> SdkResult<()> {
        if old {
            writeln!(self.out, "{}", format!("--- {label}").bold())?;
        }
        if new {
            writeln!(self.out, "{}", format!("+++ {label}").bold())?;
        }
        Ok(())
    }

    fn write_signed(&mut self, sign: &str, text: &str) -> SdkResult<()> {
        let line = format!("{sign} {text}");
        if sign == "-" {
            writeln!(self.out, "{}", line.red())?;
        } else {
            writeln!(self.out, "{}", line.green())?;
        }
        Ok(())
    }

    fn write_item(&mut self, label: &str, old: Option<Value>, new: Option<Value>) -> SdkResult<()> {
        self.write_headers(label, old.is_some(), new.is_some())?;
        let old = old.map(fields).unwrap_or_default();
        let new = new.map(fields).unwrap_or_default();
        let width = old.iter().chain(&new).map(|(k, _)| k.len()).max().unwrap_or(0);
        let mut names: Vec<&String> = old.iter().map(|(k, _)| k).collect();
        names.extend(new.iter().map(|(k, _)| k).filter(|k| !old.iter().any(|(o, _)| o == *k)));
        for name in names {
            let before = old.iter().find(|(k, _)| k == name).map(|(_, v)| v);
            let after = new.iter().find(|(k, _)| k == name).map(|(_, v)| v);
            if before == after {
                continue;
            }
            if let Some(v) = before {
                self.write_signed("-", &format!("{name:>width$} = {}", display(v)))?;
            }
            if let Some(v) = after {
                self.write_signed("+", &format!("{name:>width$} = {}", display(v)))?;
            }
        }
        Ok(())
    }
}

fn fields(value: Value) -> Vec<(String, Value)> {
    match value {
        Value::Object(map) => map.into_iter().collect(),
        other => vec![(String::new(), other)],
    }
}

fn display(value: &Value) -> String {
    match value {
        Value::String(s) => s.clone(),
        Value::Null => "␀".to_string(),
        other => other.to_string(),
    }
}

impl DiffOutput for TextOutput {
    fn write_header(&mut self, writer: &DiffWriter<'_>) -> SdkResult<()> {
        let (Some(id), Some(commit)) = (writer.target().commit(), writer.target_commit()?) else {
            return Ok(());
        };
        writeln!(self.out, "{}", format!("commit {id}").yellow())?;
        writeln!(self.out, "Author: {}", commit.author)?;
        writeln!(self.out, "Date:   {}", commit.timestamp_ms / 1000)?;
        writeln!(self.out)?;
        for line in commit.message.lines() {
            writeln!(self.out, "    {line}")?;
        }
        writeln!(self.out)?;
        Ok(())
    }

    fn write_ds_diff(&mut self, writer: &DiffWriter<'_>, ds_path: &str, ds_diff: &DatasetDiff) -> SdkResult<()> {
        for (name, delta) in ds_diff.meta() {
            self.write_meta(ds_path, name, delta)?;
        }
        let item_type = item_type_of(writer, ds_path);
        let values = ItemValues::new(writer, ds_path, ds_diff)?;
        for item in writer.filtered_dataset_deltas(ds_path, ds_diff)? {
            let (key, delta) = item?;
            let (old, new) = values.old_and_new(&delta)?;
            self.write_item(&format!("{ds_path}:{item_type}:{key}"), old, new)?;
        }
        Ok(())
    }

    fn finish(&mut self, _: &DiffWriter<'_>, _: bool) -> SdkResult<()> {
        self.out.flush()?;
        Ok(())
    }
}

/// One JSON document for the whole diff.
pub struct JsonOutput {
    out: Box<dyn Write>,
    header: Option<Value>,
    datasets: Map<String, Value>,
}

impl DiffOutput for JsonOutput {
    fn write_header(&mut self, writer: &DiffWriter<'_>) -> SdkResult<()> {
        self.header = commit_json(writer)?;
        Ok(())
    }

    fn write_ds_diff(&mut self, writer: &DiffWriter<'_>, ds_path: &str, ds_diff: &DatasetDiff) -> SdkResult<()> {
        let mut ds = Map::new();
        let meta: Map<String, Value> = ds_diff
            .meta()
            .map(|(name, d)| (name.clone(), change_json(d.old.clone(), d.new.clone())))
            .collect();
        if !meta.is_empty() {
            ds.insert("meta".into(), Value::Object(meta));
        }
        let values = ItemValues::new(writer, ds_path, ds_diff)?;
        let mut items = Vec::new();
        for item in writer.filtered_dataset_deltas(ds_path, ds_diff)? {
            let (_, delta) = item?;
            let (old, new) = values.old_and_new(&delta)?;
            items.push(change_json(old, new));
        }
        if !items.is_empty() {
            ds.insert(item_type_of(writer, ds_path).into(), Value::Array(items));
        }
        self.datasets.insert(ds_path.to_string(), Value::Object(ds));
        Ok(())
    }

    fn finish(&mut self, _: &DiffWriter<'_>, _: bool) -> SdkResult<()> {
        let mut doc = Map::new();
        if let Some(header) = self.header.take() {
            doc.insert("lode.show/v1".into(), header);
        }
        doc.insert("lode.diff/v1".into(), Value::Object(std::mem::take(&mut self.datasets)));
        serde_json::to_writer_pretty(&mut self.out, &doc).map_err(io_err)?;
        writeln!(self.out)?;
        self.out.flush()?;
        Ok(())
    }
}

/// One JSON object per line, written as the diff is produced.
pub struct JsonLinesOutput {
    out: Box<dyn Write>,
    started: bool,
}

impl JsonLinesOutput {
    fn line(&mut self, value: &Value) -> SdkResult<()> {
        if !self.started {
            self.started = true;
            self.line(&json!({"type": "version", "version": "lode.diff/v1", "outputFormat": "JSONL"}))?;
        }
        serde_json::to_writer(&mut self.out, value).map_err(io_err)?;
        writeln!(self.out)?;
        Ok(())
    }
}

impl DiffOutput for JsonLinesOutput {
    fn write_header(&mut self, writer: &DiffWriter<'_>) -> SdkResult<()> {
        if let Some(Value::Object(mut commit)) = commit_json(writer)? {
            commit.insert("type".into(), json!("commit"));
            self.line(&Value::Object(commit))?;
        }
        Ok(())
    }

    fn write_ds_diff(&mut self, writer: &DiffWriter<'_>, ds_path: &str, ds_diff: &DatasetDiff) -> SdkResult<()> {
        for (name, d) in ds_diff.meta() {
            self.line(&json!({
                "type": "meta",
                "dataset": ds_path,
                "key": name,
                "change": change_json(d.old.clone(), d.new.clone()),
            }))?;
        }
        let item_type = item_type_of(writer, ds_path);
        let values = ItemValues::new(writer, ds_path, ds_diff)?;
        for item in writer.filtered_dataset_deltas(ds_path, ds_diff)? {
            let (key, delta) = item?;
            let (old, new) = values.old_and_new(&delta)?;
            self.line(&json!({
                "type": item_type,
                "dataset": ds_path,
                "key": key_json(&key),
                "change": change_json(old, new),
            }))?;
        }
        Ok(())
    }

    fn finish(&mut self, _: &DiffWriter<'_>, _: bool) -> SdkResult<()> {
        if !self.started {
            self.line(&json!({"type": "version", "version": "lode.diff/v1", "outputFormat": "JSONL"}))?;
        }
        self.out.flush()?;
        Ok(())
    }
}

fn key_json(key: &ItemKey) -> Value {
    match key {
        ItemKey::Int(i) => json!(i),
        ItemKey::Str(s) => json!(s),
    }
}

/// Changed item counts per dataset, ignoring the spatial filter.
pub struct FeatureCountOutput {
    out: Box<dyn Write>,
    json: bool,
    counts: Vec<(String, &'static str, usize)>,
}

impl DiffOutput for FeatureCountOutput {
    fn write_ds_diff(&mut self, writer: &DiffWriter<'_>, ds_path: &str, ds_diff: &DatasetDiff) -> SdkResult<()> {
        let count = ds_diff.feature_count();
        if count > 0 {
            self.counts.push((ds_path.to_string(), item_type_of(writer, ds_path), count));
        }
        Ok(())
    }

    fn wants_deltas(&self) -> bool {
        false
    }

    fn finish(&mut self, _: &DiffWriter<'_>, _: bool) -> SdkResult<()> {
        if self.json {
            let counts: Map<String, Value> = self
                .counts
                .iter()
                .map(|(path, _, n)| (path.clone(), json!(n)))
                .collect();
            serde_json::to_writer_pretty(&mut self.out, &counts).map_err(io_err)?;
            writeln!(self.out)?;
        } else if self.counts.is_empty() {
            writeln!(self.out, "0 features changed")?;
        } else {
            for (path, item_type, n) in &self.counts {
                let plural = if *n == 1 { "" } else { "s" };
                writeln!(self.out, "{path}:")?;
                writeln!(self.out, "\t{n} {item_type}{plural} changed")?;
            }
        }
        self.out.flush()?;
        Ok(())
    }
}
