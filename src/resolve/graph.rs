//! Dependency graph and version mediation
//!
//! The graph is built first and mediated afterwards, so mediation is a pure
//! function of the graph and the policy. Directly requested coordinates
//! always win over anything pulled in transitively.

use crate::error::{PlugdepsError, PlugdepsResult};
use crate::model::{Coordinate, ModuleId};
use serde::{Deserialize, Serialize};
use std::cmp::Ordering;
use std::collections::{HashMap, HashSet, VecDeque};
use std::fmt;

/// How competing versions of one module are settled
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum MediationPolicy {
    /// Version closest to a root wins; ties go to the first one found
    #[default]
    NearestWins,
    /// Highest version wins
    HighestVersion,
    /// Differing versions are an error
    Strict,
}

impl fmt::Display for MediationPolicy {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::NearestWins => write!(f, "nearest-wins"),
            Self::HighestVersion => write!(f, "highest-version"),
            Self::Strict => write!(f, "strict"),
        }
    }
}

/// Compare two version strings.
///
/// Semantic versions compare by semver rules. Anything else is split on `.`
/// and `-`; numeric segments compare numerically, others lexically, and a
/// missing segment sorts first.
pub fn compare_versions(a: &str, b: &str) -> Ordering {
    if let (Ok(x), Ok(y)) = (semver::Version::parse(a), semver::Version::parse(b)) {
        return x.cmp(&y);
    }

    let split = |s: &str| -> Vec<String> {
        s.split(['.', '-'])
            .map(str::to_string)
            .collect()
    };
    let (left, right) = (split(a), split(b));

    for i in 0..left.len().max(right.len()) {
        let ordering = match (left.get(i), right.get(i)) {
            (Some(x), Some(y)) => match (x.parse::<u64>(), y.parse::<u64>()) {
                (Ok(x), Ok(y)) => x.cmp(&y),
                (Ok(_), Err(_)) => Ordering::Greater,
                (Err(_), Ok(_)) => Ordering::Less,
                (Err(_), Err(_)) => x.cmp(y),
            },
            (Some(_), None) => Ordering::Greater,
            (None, Some(_)) => Ordering::Less,
            (None, None) => Ordering::Equal,
        };
        if ordering != Ordering::Equal {
            return ordering;
        }
    }
    Ordering::Equal
}

/// Versionless identity of an artifact, the unit of mediation
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
struct MediationKey {
    module: ModuleId,
    classifier: Option<String>,
    extension: String,
}

impl MediationKey {
    fn of(coordinate: &Coordinate) -> Self {
        Self {
            module: coordinate.module(),
            classifier: coordinate.classifier().map(str::to_string),
            extension: coordinate.extension().to_string(),
        }
    }
}

#[derive(Debug)]
struct Node {
    coordinate: Coordinate,
    depth: usize,
    children: Vec<usize>,
}

/// A coordinate chosen by mediation, in result order
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Selection {
    pub coordinate: Coordinate,
    /// Distance from the nearest root (0 for requested coordinates)
    pub depth: usize,
    /// Indices of the roots that reach this coordinate
    pub roots: Vec<usize>,
}

/// Requested coordinates and everything they pull in
#[derive(Debug, Default)]
pub struct DependencyGraph {
    roots: Vec<usize>,
    nodes: Vec<Node>,
    index: HashMap<Coordinate, usize>,
}

impl DependencyGraph {
    pub fn new() -> Self {
        Self::default()
    }

    fn node(&mut self, coordinate: Coordinate, depth: usize) -> usize {
        if let Some(&id) = self.index.get(&coordinate) {
            let node = &mut self.nodes[id];
            node.depth = node.depth.min(depth);
            return id;
        }
        let id = self.nodes.len();
        self.index.insert(coordinate.clone(), id);
        self.nodes.push(Node {
            coordinate,
            depth,
            children: Vec::new(),
        });
        id
    }

    /// Add a requested coordinate; returns its root index
    pub fn add_root(&mut self, coordinate: Coordinate) -> usize {
        let id = self.node(coordinate, 0);
        self.roots.push(id);
        self.roots.len() - 1
    }

    /// Record that `parent` depends on `child`. The parent must already be
    /// in the graph.
    pub fn add_edge(&mut self, parent: &Coordinate, child: Coordinate) -> PlugdepsResult<()> {
        let parent_id = *self.index.get(parent).ok_or_else(|| {
            PlugdepsError::Internal(format!("{} is not in the dependency graph", parent))
        })?;
        let depth = self.nodes[parent_id].depth + 1;
        let child_id = self.node(child, depth);
        if !self.nodes[parent_id].children.contains(&child_id) {
            self.nodes[parent_id].children.push(child_id);
        }
        Ok(())
    }

    /// Depth of a coordinate, if present
    pub fn depth(&self, coordinate: &Coordinate) -> Option<usize> {
        self.index.get(coordinate).map(|&id| self.nodes[id].depth)
    }

    pub fn len(&self) -> usize {
        self.nodes.len()
    }

    pub fn is_empty(&self) -> bool {
        self.nodes.is_empty()
    }

    /// Pick one version per module and order the result: roots in request
    /// order, each followed by what it pulls in (breadth first). Only edges
    /// of selected versions are followed.
    pub fn mediate(&self, policy: MediationPolicy) -> PlugdepsResult<Vec<Selection>> {
        let selected = self.select_versions(policy)?;
        let is_selected = |id: usize| {
            selected.get(&MediationKey::of(&self.nodes[id].coordinate)) == Some(&id)
        };

        let mut order: Vec<usize> = Vec::new();
        let mut reached_by: HashMap<usize, Vec<usize>> = HashMap::new();

        for (root_index, &root) in self.roots.iter().enumerate() {
            if !is_selected(root) {
                continue;
            }
            let mut visited = HashSet::new();
            let mut queue = VecDeque::from([root]);
            visited.insert(root);

            while let Some(id) = queue.pop_front() {
                let roots = reached_by.entry(id).or_default();
                if roots.is_empty() {
                    order.push(id);
                }
                if !roots.contains(&root_index) {
                    roots.push(root_index);
                }
                for &child in &self.nodes[id].children {
                    if is_selected(child) && visited.insert(child) {
                        queue.push_back(child);
                    }
                }
            }
        }

        Ok(order
            .into_iter()
            .map(|id| Selection {
                coordinate: self.nodes[id].coordinate.clone(),
                depth: self.nodes[id].depth,
                roots: reached_by.remove(&id).unwrap_or_default(),
            })
            .collect())
    }

    fn select_versions(&self, policy: MediationPolicy) -> PlugdepsResult<HashMap<MediationKey, usize>> {
        let mut groups: Vec<(MediationKey, Vec<usize>)> = Vec::new();
        let mut group_index: HashMap<MediationKey, usize> = HashMap::new();
        for (id, node) in self.nodes.iter().enumerate() {
            let key = MediationKey::of(&node.coordinate);
            match group_index.get(&key) {
                Some(&g) => groups[g].1.push(id),
                None => {
                    group_index.insert(key.clone(), groups.len());
                    groups.push((key, vec![id]));
                }
            }
        }

        let mut selected = HashMap::new();
        for (key, ids) in groups {
            let requested = self.roots.iter().copied().find(|r| ids.contains(r));
            let winner = match requested {
                Some(root) => root,
                None => self.pick(&key, &ids, policy)?,
            };
            selected.insert(key, winner);
        }
        Ok(selected)
    }

    fn pick(&self, key: &MediationKey, ids: &[usize], policy: MediationPolicy) -> PlugdepsResult<usize> {
        let first = ids[0];
        match policy {
            MediationPolicy::NearestWins => Ok(ids
                .iter()
                .copied()
                .min_by_key(|&id| (self.nodes[id].depth, id))
                .unwrap_or(first)),
            MediationPolicy::HighestVersion => Ok(ids
                .iter()
                .copied()
                .reduce(|best, id| {
                    let ordering = compare_versions(
                        self.nodes[id].coordinate.version(),
                        self.nodes[best].coordinate.version(),
                    );
                    if ordering == Ordering::Greater {
                        id
                    } else {
                        best
                    }
                })
                .unwrap_or(first)),
            MediationPolicy::Strict => {
                if ids.len() > 1 {
                    let versions = ids
                        .iter()
                        .map(|&id| self.nodes[id].coordinate.version())
                        .collect::<Vec<_>>()
                        .join(", ");
                    return Err(PlugdepsError::VersionConflict {
                        module: key.module.to_string(),
                        versions,
                    });
                }
                Ok(first)
            }
        }
    }
}
