use indexmap::IndexMap;
use strata_engine::{PropertyMap, ResourceInfo, ResourceUrn, StepOp, StepStatus};
use strata_tree::{FlatTree, TreeRow};

use std::collections::HashSet;

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub enum ItemStatus {
    #[default]
    None,
    Pending,
    Running,
    Success,
    Failed,
}

impl From<StepStatus> for ItemStatus {
    fn from(status: StepStatus) -> Self {
        match status {
            StepStatus::Pending => ItemStatus::Pending,
            StepStatus::Running => ItemStatus::Running,
            StepStatus::Success => ItemStatus::Success,
            StepStatus::Failed => ItemStatus::Failed,
        }
    }
}

/// One row of resource data, whichever view shows it.
///
/// `inputs`/`outputs` are the state after the step, `old_*` the state
/// before it.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct ResourceItem {
    pub urn: ResourceUrn,
    pub resource_type: String,
    pub name: String,
    pub parent: Option<ResourceUrn>,
    pub op: StepOp,
    pub status: ItemStatus,
    pub inputs: Option<PropertyMap>,
    pub outputs: Option<PropertyMap>,
    pub old_inputs: Option<PropertyMap>,
    pub old_outputs: Option<PropertyMap>,
    pub id: Option<String>,
    pub protect: bool,
    pub message: Option<String>,
}

impl From<ResourceInfo> for ResourceItem {
    fn from(resource: ResourceInfo) -> Self {
        let name = resource.urn.name().unwrap_or_default().to_owned();
        ResourceItem {
            name,
            urn: resource.urn,
            resource_type: resource.resource_type,
            parent: resource.parent,
            inputs: resource.inputs,
            outputs: resource.outputs,
            id: resource.id,
            protect: resource.protect,
            ..Default::default()
        }
    }
}

/// Display items keyed by URN, in arrival order.
#[derive(Debug, Clone, Default)]
pub struct ResourceList {
    items: IndexMap<ResourceUrn, ResourceItem>,
}

impl ResourceList {
    pub fn new() -> Self {
        Self::default()
    }

    /// Add, or replace the entry with the same URN in place.
    pub fn upsert(&mut self, item: ResourceItem) {
        self.items.insert(item.urn.clone(), item);
    }

    pub fn replace_all(&mut self, items: impl IntoIterator<Item = ResourceItem>) {
        self.items = items
            .into_iter()
            .map(|item| (item.urn.clone(), item))
            .collect();
    }

    pub fn clear(&mut self) {
        self.items.clear();
    }

    pub fn len(&self) -> usize {
        self.items.len()
    }

    pub fn is_empty(&self) -> bool {
        self.items.is_empty()
    }

    pub fn get(&self, urn: &ResourceUrn) -> Option<&ResourceItem> {
        self.items.get(urn)
    }

    pub fn get_index(&self, index: usize) -> Option<&ResourceItem> {
        self.items.get_index(index).map(|(_, item)| item)
    }

    pub fn iter(&self) -> impl Iterator<Item = &ResourceItem> {
        self.items.values()
    }

    /// Rows of the parent/child tree, hiding children of collapsed URNs.
    /// Each row's `index` points into this list.
    pub fn rows(&self, collapsed: &HashSet<ResourceUrn>) -> Vec<TreeRow> {
        let tree = FlatTree::from_items(
            self.items
                .values()
                .enumerate()
                .map(|(index, item)| (item.urn.clone(), item.parent.clone(), index)),
        );
        tree.visible_rows(collapsed)
            .into_iter()
            .filter_map(|row| {
                let node = tree.get(row.index).ok()?;
                Some(TreeRow {
                    index: node.node,
                    ..row
                })
            })
            .collect()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn item(urn: &str, parent: Option<&str>) -> ResourceItem {
        ResourceItem {
            urn: urn.into(),
            parent: parent.map(ResourceUrn::from),
            ..Default::default()
        }
    }

    #[test]
    fn test_upsert_replaces_in_place() {
        let mut list = ResourceList::new();
        list.upsert(item("a", None));
        list.upsert(item("b", None));
        list.upsert(ResourceItem {
            status: ItemStatus::Success,
            ..item("a", None)
        });

        assert_eq!(list.len(), 2);
        assert_eq!(list.get_index(0).unwrap().status, ItemStatus::Success);
    }

    #[test]
    fn test_rows_index_into_list() {
        let mut list = ResourceList::new();
        list.upsert(item("child", Some("root")));
        list.upsert(item("root", None));

        let rows = list.rows(&HashSet::new());

        let urns: Vec<_> = rows
            .iter()
            .map(|row| list.get_index(row.index).unwrap().urn.as_str())
            .collect();
        assert_eq!(urns, vec!["root", "child"]);
        assert_eq!(rows[1].depth, 1);
    }

    #[test]
    fn test_from_resource_info_takes_name_from_urn() {
        let item = ResourceItem::from(ResourceInfo {
            urn: "urn:pulumi:dev::shop::aws:s3/bucket:Bucket::assets".into(),
            protect: true,
            ..Default::default()
        });
        assert_eq!(item.name, "assets");
        assert!(item.protect);
    }
}
