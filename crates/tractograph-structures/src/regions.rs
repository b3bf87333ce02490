// Copyright 2025 Neuraville Inc.
// SPDX-License-Identifier: Apache-2.0

//! Region descriptions: one record per parcellation label, read from GraphML.

use std::collections::BTreeSet;
use std::path::Path;

use serde::{Deserialize, Serialize};

use crate::error::{Result, StructuresError};
use crate::graph::RegionId;
use crate::graphml::{read_graphml, GraphmlDocument, GraphmlNode};

/// Region attributes declared by a region-description file
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RegionDescription {
    /// Graph node id; the label streamline endpoints resolve to
    pub label: RegionId,
    /// Voxel value of the region in its parcellation volume
    /// (`dn_correspondence_id`)
    pub voxel_id: i64,
    /// Scale-independent region id (`dn_multiscaleID`)
    pub multiscale_id: i64,
    pub name: String,
    /// FreeSurfer structure name
    pub fs_name: String,
    pub hemisphere: String,
    /// Coarse region class, e.g. "cortical" or "subcortical"
    pub region: String,
}

impl RegionDescription {
    /// Description with empty text attributes and both ids equal to `label`
    pub fn unnamed(label: RegionId) -> Self {
        Self {
            label,
            voxel_id: i64::from(label),
            multiscale_id: i64::from(label),
            name: String::new(),
            fs_name: String::new(),
            hemisphere: String::new(),
            region: String::new(),
        }
    }
}

fn parse_integer(value: &str) -> Option<i64> {
    let value = value.trim();
    value.parse::<i64>().ok().or_else(|| {
        value
            .parse::<f64>()
            .ok()
            .filter(|v| v.fract() == 0.0 && v.is_finite())
            .map(|v| v as i64)
    })
}

fn describe(node: &GraphmlNode) -> Result<RegionDescription> {
    let label = parse_integer(&node.id)
        .filter(|&v| v > 0 && v <= i64::from(RegionId::MAX))
        .ok_or_else(|| {
            StructuresError::Graphml(format!(
                "region node id '{}' is not a positive integer label",
                node.id
            ))
        })? as RegionId;

    let text = |key: &str| node.data.get(key).cloned().unwrap_or_default();

    let integer = |key: &str| -> Result<Option<i64>> {
        node.data
            .get(key)
            .map(|raw| {
                parse_integer(raw).ok_or_else(|| {
                    StructuresError::Graphml(format!(
                        "region {} has non-integer {} '{}'",
                        label, key, raw
                    ))
                })
            })
            .transpose()
    };
    let correspondence_id = integer("dn_correspondence_id")?;
    let multiscale_id = integer("dn_multiscaleID")?;

    // Parcellation volumes are written with the correspondence id
    let voxel_id = correspondence_id
        .or(multiscale_id)
        .unwrap_or_else(|| i64::from(label));

    Ok(RegionDescription {
        label,
        voxel_id,
        multiscale_id: multiscale_id.unwrap_or(voxel_id),
        name: text("dn_name"),
        fs_name: text("dn_fsname"),
        hemisphere: text("dn_hemisphere"),
        region: text("dn_region"),
    })
}

/// Region descriptions from a parsed GraphML document, sorted by label
pub fn region_descriptions(document: &GraphmlDocument) -> Result<Vec<RegionDescription>> {
    let mut seen = BTreeSet::new();
    let mut regions = Vec::with_capacity(document.nodes.len());
    for node in &document.nodes {
        let region = describe(node)?;
        if !seen.insert(region.label) {
            return Err(StructuresError::Graphml(format!(
                "region label {} is declared twice",
                region.label
            )));
        }
        regions.push(region);
    }
    regions.sort_by_key(|r| r.label);
    Ok(regions)
}

/// Read a region-description GraphML file
pub fn read_region_descriptions<P: AsRef<Path>>(path: P) -> Result<Vec<RegionDescription>> {
    region_descriptions(&read_graphml(path)?)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::graphml::parse_graphml;

    fn doc(nodes: &str) -> GraphmlDocument {
        let text = format!(
            r#"<graphml>
  <key id="d0" for="node" attr.name="dn_name"/>
  <key id="d1" for="node" attr.name="dn_multiscaleID"/>
  <key id="d2" for="node" attr.name="dn_correspondence_id"/>
  <key id="d3" for="node" attr.name="dn_hemisphere"/>
  <graph edgedefault="undirected">{}</graph>
</graphml>"#,
            nodes
        );
        parse_graphml(&text).unwrap()
    }

    #[test]
    fn test_multiscale_and_correspondence_ids() {
        let regions = region_descriptions(&doc(
            r#"<node id="2"><data key="d0">insula</data><data key="d2">1035</data></node>
               <node id="1"><data key="d0">cuneus</data><data key="d1">5.0</data><data key="d3">left</data></node>
               <node id="3"/>"#,
        ))
        .unwrap();

        assert_eq!(regions.len(), 3);
        assert_eq!(regions[0].label, 1);
        assert_eq!((regions[0].voxel_id, regions[0].multiscale_id), (5, 5));
        assert_eq!(regions[0].hemisphere, "left");
        assert_eq!((regions[1].voxel_id, regions[1].multiscale_id), (1035, 1035));
        assert_eq!(regions[1].name, "insula");
        assert_eq!(regions[2], RegionDescription::unnamed(3));
    }

    #[test]
    fn test_correspondence_id_is_the_voxel_value() {
        let regions = region_descriptions(&doc(
            r#"<node id="1"><data key="d1">1012</data><data key="d2">12</data></node>
               <node id="2"><data key="d2">7</data><data key="d1">7</data></node>"#,
        ))
        .unwrap();

        assert_eq!(regions[0].voxel_id, 12);
        assert_eq!(regions[0].multiscale_id, 1012);
        assert_eq!((regions[1].voxel_id, regions[1].multiscale_id), (7, 7));
    }

    #[test]
    fn test_non_integer_voxel_id() {
        let err = region_descriptions(&doc(r#"<node id="1"><data key="d2">lh</data></node>"#))
            .unwrap_err();
        assert!(err.to_string().contains("dn_correspondence_id"));
    }

    #[test]
    fn test_invalid_labels() {
        assert!(region_descriptions(&doc(r#"<node id="lh.cuneus"/>"#)).is_err());
        assert!(region_descriptions(&doc(r#"<node id="0"/>"#)).is_err());
        assert!(region_descriptions(&doc(r#"<node id="4"/><node id="4"/>"#)).is_err());
    }
}
