// Copyright © 2018 Cormac O'Brien
//
// Permission is hereby granted, free of charge, to any person obtaining a copy of this software
// and associated documentation files (the "Software"), to deal in the Software without
// restriction, including without limitation the rights to use, copy, modify, merge, publish,
// distribute, sublicense, and/or sell copies of the Software, and to permit persons to whom the
// Software is furnished to do so, subject to the following conditions:
//
// The above copyright notice and this permission notice shall be included in all copies or
// substantial portions of the Software.
//
// THE SOFTWARE IS PROVIDED "AS IS", WITHOUT WARRANTY OF ANY KIND, EXPRESS OR IMPLIED, INCLUDING
// BUT NOT LIMITED TO THE WARRANTIES OF MERCHANTABILITY, FITNESS FOR A PARTICULAR PURPOSE AND
// NONINFRINGEMENT. IN NO EVENT SHALL THE AUTHORS OR COPYRIGHT HOLDERS BE LIABLE FOR ANY CLAIM,
// DAMAGES OR OTHER LIABILITY, WHETHER IN AN ACTION OF CONTRACT, TORT OR OTHERWISE, ARISING FROM,
// OUT OF OR IN CONNECTION WITH THE SOFTWARE OR THE USE OR OTHER DEALINGS IN THE SOFTWARE.

//! Draw tree and collision hull construction.

use std::collections::HashSet;

use crate::common::bsp::{
    error::out_of_range,
    lump::{DiskClipNode, DiskNode},
    BspError, BspLeaf, BspLeafContents, BspNode, Child, ClipChild, ClipNode, Hull, HullNodes,
    MAX_MAP_HULLS,
};

use cgmath::{Vector3, Zero};

/// Decodes the draw nodes, checking every plane, child and surface reference.
pub fn load_nodes(
    disk_nodes: &[DiskNode],
    plane_count: usize,
    leaf_count: usize,
    surface_count: usize,
) -> Result<Vec<BspNode>, BspError> {
    let node_count = disk_nodes.len();
    let mut nodes = Vec::with_capacity(node_count);

    for disk in disk_nodes.iter() {
        if disk.plane_id < 0 || disk.plane_id as usize >= plane_count {
            return Err(out_of_range("plane", disk.plane_id as i64, plane_count));
        }

        let mut children = [Child::Node(0); 2];
        for (slot, raw) in children.iter_mut().zip(disk.children.iter()) {
            *slot = match Child::from_raw(*raw) {
                Child::Node(n) if n >= node_count => {
                    return Err(out_of_range("node", n as i64, node_count));
                }
                Child::Leaf(l) if l >= leaf_count => {
                    return Err(out_of_range("leaf", l as i64, leaf_count));
                }
                c => c,
            };
        }

        let first_surface = disk.first_face as usize;
        let surface_count_here = disk.face_count as usize;
        if first_surface + surface_count_here > surface_count {
            return Err(out_of_range(
                "surface",
                (first_surface + surface_count_here) as i64,
                surface_count,
            ));
        }

        nodes.push(BspNode {
            plane_id: disk.plane_id as usize,
            children,
            mins: disk.mins,
            maxs: disk.maxs,
            first_surface,
            surface_count: surface_count_here,
            parent: None,
        });
    }

    Ok(nodes)
}

/// Links every node and leaf reachable from node 0 to its parent.
///
/// The tree is walked with an explicit worklist. A child reached a second time keeps its first
/// parent.
pub fn set_parents(nodes: &mut [BspNode], leaves: &mut [BspLeaf]) {
    if nodes.is_empty() {
        return;
    }

    let mut visited = HashSet::new();
    let mut worklist = vec![0];
    visited.insert(Child::Node(0));

    while let Some(node_id) = worklist.pop() {
        let children = nodes[node_id].children;
        for child in children.iter() {
            if !visited.insert(*child) {
                warn!("Node {} revisits {:?}, skipping", node_id, child);
                continue;
            }

            match *child {
                Child::Node(n) => {
                    nodes[n].parent = Some(node_id);
                    worklist.push(n);
                }
                Child::Leaf(l) => leaves[l].parent = Some(node_id),
            }
        }
    }
}

/// Builds the point hull's clipping nodes from the draw tree.
///
/// Each node keeps its plane; leaf children are replaced by the leaf's contents.
pub fn make_hull0(nodes: &[BspNode], leaves: &[BspLeaf]) -> Box<[ClipNode]> {
    nodes
        .iter()
        .map(|node| {
            let convert = |child: Child| match child {
                Child::Node(n) => ClipChild::Node(n),
                Child::Leaf(l) => ClipChild::Contents(leaves[l].contents),
            };

            ClipNode {
                plane_id: node.plane_id,
                children: [convert(node.children[0]), convert(node.children[1])],
            }
        })
        .collect::<Vec<_>>()
        .into_boxed_slice()
}

/// Decodes the clipping nodes shared by the player and large-monster hulls.
pub fn load_clip_nodes(
    disk_nodes: &[DiskClipNode],
    plane_count: usize,
) -> Result<Box<[ClipNode]>, BspError> {
    let node_count = disk_nodes.len();
    let mut nodes = Vec::with_capacity(node_count);

    for disk in disk_nodes.iter() {
        if disk.plane_id < 0 || disk.plane_id as usize >= plane_count {
            return Err(out_of_range("plane", disk.plane_id as i64, plane_count));
        }

        let mut children = [ClipChild::Node(0); 2];
        for (slot, raw) in children.iter_mut().zip(disk.children.iter()) {
            *slot = match *raw {
                n if n >= 0 => {
                    if n as usize >= node_count {
                        return Err(out_of_range("clip node", n as i64, node_count));
                    }
                    ClipChild::Node(n as usize)
                }
                c => ClipChild::Contents(BspLeafContents::from_raw(c as i32)?),
            };
        }

        nodes.push(ClipNode {
            plane_id: disk.plane_id as usize,
            children,
        });
    }

    Ok(nodes.into_boxed_slice())
}

/// Assembles the four collision hulls.
///
/// Hull 0 is the point hull, hull 1 is player-sized and hull 2 is for large monsters. Hulls 1
/// and 2 share the same clipping nodes; hull 3 is unused.
pub fn make_hulls(hull0: Box<[ClipNode]>, clip_nodes: Box<[ClipNode]>) -> [Hull; MAX_MAP_HULLS] {
    [
        Hull {
            nodes: HullNodes::Owned(hull0),
            mins: Vector3::zero(),
            maxs: Vector3::zero(),
        },
        Hull {
            nodes: HullNodes::Owned(clip_nodes),
            mins: Vector3::new(-16.0, -16.0, -24.0),
            maxs: Vector3::new(16.0, 16.0, 32.0),
        },
        Hull {
            nodes: HullNodes::SharedWith(1),
            mins: Vector3::new(-32.0, -32.0, -24.0),
            maxs: Vector3::new(32.0, 32.0, 64.0),
        },
        Hull {
            nodes: HullNodes::Unused,
            mins: Vector3::zero(),
            maxs: Vector3::zero(),
        },
    ]
}
