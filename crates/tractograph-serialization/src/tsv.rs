// Copyright 2025 Neuraville Inc.
// SPDX-License-Identifier: Apache-2.0

//! Edge-list table.
//!
//! Header is `source`, `target`, then the sorted union of metric keys over
//! all edges. Rows follow canonical edge order. An edge that does not carry a
//! metric leaves the cell empty; non-finite values are written as `nan`/`inf`.

use std::collections::BTreeMap;
use std::fs::File;
use std::io::{BufRead, BufReader, BufWriter, Write};
use std::path::Path;

use tractograph_structures::{ConnectivityGraph, EdgeKey, EdgeMetrics, RegionId};

use crate::{format_value, parse_value, Result, SerializationError};

const FORMAT: &str = "TSV";

/// Write the edge table of `graph`
pub fn write_tsv<W: Write>(mut writer: W, graph: &ConnectivityGraph) -> Result<()> {
    let keys = graph.metric_keys();

    write!(writer, "source\ttarget")?;
    for key in &keys {
        write!(writer, "\t{}", key)?;
    }
    writeln!(writer)?;

    for (edge, metrics) in &graph.edges {
        let values: BTreeMap<String, f64> = metrics.entries().into_iter().collect();
        write!(writer, "{}\t{}", edge.source(), edge.target())?;
        for key in &keys {
            match values.get(key) {
                Some(value) => write!(writer, "\t{}", format_value(*value))?,
                None => write!(writer, "\t")?,
            }
        }
        writeln!(writer)?;
    }
    writer.flush()?;
    Ok(())
}

pub fn write_tsv_file<P: AsRef<Path>>(path: P, graph: &ConnectivityGraph) -> Result<()> {
    let path = path.as_ref();
    let file = File::create(path).map_err(|e| SerializationError::io(path, e))?;
    write_tsv(BufWriter::new(file), graph).map_err(|e| match e {
        SerializationError::Stream(source) => SerializationError::io(path, source),
        other => other,
    })
}

fn parse_label(text: &str, line: usize) -> Result<RegionId> {
    text.trim().parse::<RegionId>().map_err(|_| {
        SerializationError::format(FORMAT, format!("line {}: invalid region id '{}'", line, text))
    })
}

/// Read an edge table back into canonical edges
pub fn read_tsv<R: BufRead>(reader: R) -> Result<BTreeMap<EdgeKey, EdgeMetrics>> {
    let mut lines = reader.lines();
    let header = match lines.next() {
        Some(line) => line?,
        None => return Err(SerializationError::format(FORMAT, "empty table")),
    };
    let columns: Vec<&str> = header.split('\t').collect();
    if columns.len() < 2 || columns[0] != "source" || columns[1] != "target" {
        return Err(SerializationError::format(
            FORMAT,
            "header must start with 'source' and 'target'",
        ));
    }
    let keys = &columns[2..];

    let mut edges = BTreeMap::new();
    for (index, line) in lines.enumerate() {
        let line = line?;
        let line_no = index + 2;
        if line.trim().is_empty() {
            continue;
        }
        let cells: Vec<&str> = line.split('\t').collect();
        if cells.len() != columns.len() {
            return Err(SerializationError::format(
                FORMAT,
                format!(
                    "line {}: expected {} cells, found {}",
                    line_no,
                    columns.len(),
                    cells.len()
                ),
            ));
        }

        let key = EdgeKey::new(parse_label(cells[0], line_no)?, parse_label(cells[1], line_no)?);
        let mut entries = Vec::with_capacity(keys.len());
        for (name, cell) in keys.iter().zip(&cells[2..]) {
            if cell.is_empty() {
                continue;
            }
            let value = parse_value(cell).ok_or_else(|| {
                SerializationError::format(
                    FORMAT,
                    format!("line {}: '{}' is not a number for {}", line_no, cell, name),
                )
            })?;
            entries.push((*name, value));
        }
        let metrics = EdgeMetrics::from_entries(entries)?;

        if edges.insert(key, metrics).is_some() {
            return Err(SerializationError::format(
                FORMAT,
                format!(
                    "line {}: edge ({}, {}) appears twice",
                    line_no,
                    key.source(),
                    key.target()
                ),
            ));
        }
    }
    Ok(edges)
}

pub fn read_tsv_file<P: AsRef<Path>>(path: P) -> Result<BTreeMap<EdgeKey, EdgeMetrics>> {
    let path = path.as_ref();
    let file = File::open(path).map_err(|e| SerializationError::io(path, e))?;
    read_tsv(BufReader::new(file))
}

#[cfg(test)]
mod tests {
    use super::*;
    use tractograph_structures::ScalarStats;

    fn graph() -> ConnectivityGraph {
        let mut graph = ConnectivityGraph::new("scale1");
        let mut with_map = EdgeMetrics {
            number_of_fibers: 3,
            fiber_length: Some(ScalarStats {
                mean: 12.5,
                median: 12.0,
                std: f64::NAN,
            }),
            fiber_proportion: Some(75.0),
            ..EdgeMetrics::default()
        };
        with_map.scalars.insert(
            "fa".to_string(),
            ScalarStats {
                mean: 0.5,
                median: 0.5,
                std: 0.0,
            },
        );
        graph.insert_edge(2, 1, with_map);
        graph.insert_edge(
            3,
            3,
            EdgeMetrics {
                number_of_fibers: 1,
                fiber_proportion: Some(25.0),
                ..EdgeMetrics::default()
            },
        );
        graph
    }

    #[test]
    fn test_header_is_union_of_keys() {
        let mut buffer = Vec::new();
        write_tsv(&mut buffer, &graph()).unwrap();
        let text = String::from_utf8(buffer).unwrap();
        let mut lines = text.lines();
        assert_eq!(
            lines.next().unwrap(),
            "source\ttarget\tfa_mean\tfa_median\tfa_std\tfiber_length_mean\tfiber_length_median\tfiber_length_std\tfiber_proportion\tnumber_of_fibers"
        );
        assert_eq!(lines.next().unwrap(), "1\t2\t0.5\t0.5\t0\t12.5\t12\tnan\t75\t3");
        assert_eq!(lines.next().unwrap(), "3\t3\t\t\t\t\t\t\t25\t1");
        assert!(lines.next().is_none());
    }

    #[test]
    fn test_read_back_keeps_missing_metrics_missing() {
        let mut buffer = Vec::new();
        write_tsv(&mut buffer, &graph()).unwrap();
        let edges = read_tsv(buffer.as_slice()).unwrap();

        assert_eq!(edges.len(), 2);
        let first = &edges[&EdgeKey::new(1, 2)];
        assert_eq!(first.number_of_fibers, 3);
        assert!(first.fiber_length.unwrap().std.is_nan());
        assert_eq!(first.scalars["fa"].mean, 0.5);
        let self_edge = &edges[&EdgeKey::new(3, 3)];
        assert!(self_edge.fiber_length.is_none());
        assert!(self_edge.scalars.is_empty());
    }

    #[test]
    fn test_malformed_tables() {
        assert!(read_tsv("".as_bytes()).is_err());
        assert!(read_tsv("from\tto\n".as_bytes()).is_err());
        assert!(read_tsv("source\ttarget\tnumber_of_fibers\n1\t2\n".as_bytes()).is_err());
        assert!(read_tsv("source\ttarget\tnumber_of_fibers\n1\tx\t3\n".as_bytes()).is_err());
        let duplicate = "source\ttarget\tnumber_of_fibers\n1\t2\t3\n2\t1\t4\n";
        assert!(read_tsv(duplicate.as_bytes()).is_err());
    }
}
