// SPDX-License-Identifier: Apache-2.0
// Copyright © 2025 Au-Zone Technologies. All Rights Reserved.

use crate::{annotations::SplitTable, labels::LabelCodes};
use std::collections::{BTreeMap, HashMap};

/// Box coordinates of one annotated object, normalized to `[0, 1]`.
#[derive(Clone, Copy, Debug, PartialEq)]
pub struct BoundingBox {
    pub x_min: f32,
    pub x_max: f32,
    pub y_min: f32,
    pub y_max: f32,
}

/// Boxes of one label keyed by image identifier.
///
/// Image identifiers iterate in ascending order and each image keeps its
/// boxes in table row order.
pub type ImageGroups = BTreeMap<String, Vec<BoundingBox>>;

/// Per-label image groups derived from one split table.
#[derive(Clone, Debug, Default, PartialEq)]
pub struct BoundingBoxGroups {
    groups: Vec<(String, ImageGroups)>,
}

impl BoundingBoxGroups {
    /// Image groups for `label`, or `None` if the label was not part of the
    /// grouping.
    pub fn get(&self, label: &str) -> Option<&ImageGroups> {
        self.groups
            .iter()
            .find(|(l, _)| l == label)
            .map(|(_, g)| g)
    }

    /// Image identifiers of `label` in grouping order.
    pub fn image_ids(&self, label: &str) -> Vec<&str> {
        self.get(label)
            .map(|groups| groups.keys().map(String::as_str).collect())
            .unwrap_or_default()
    }

    /// `(label, groups)` pairs in label resolution order.
    pub fn iter(&self) -> impl Iterator<Item = (&str, &ImageGroups)> {
        self.groups.iter().map(|(l, g)| (l.as_str(), g))
    }
}

/// Group the rows of `table` by image for every label in `codes`.
///
/// Rows whose class code belongs to no requested label are dropped. A label
/// whose code matches no row gets an empty group map.
#[cfg_attr(feature = "profiling", tracing::instrument(skip_all))]
pub fn group(table: &SplitTable, codes: &LabelCodes) -> BoundingBoxGroups {
    let mut by_code: HashMap<&str, ImageGroups> =
        codes.iter().map(|(_, code)| (code, ImageGroups::new())).collect();

    for row in table.rows() {
        if let Some(images) = by_code.get_mut(row.label_name.as_str()) {
            images
                .entry(row.image_id.clone())
                .or_default()
                .push(BoundingBox {
                    x_min: row.x_min,
                    x_max: row.x_max,
                    y_min: row.y_min,
                    y_max: row.y_max,
                });
        }
    }

    let groups = codes
        .iter()
        .map(|(label, code)| {
            let images = by_code.get(code).cloned().unwrap_or_default();
            (label.to_string(), images)
        })
        .collect();

    BoundingBoxGroups { groups }
}
