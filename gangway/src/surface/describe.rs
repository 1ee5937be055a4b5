//! Surface serialization and path-based dispatch.
//!
//! [`describe`] performs the circular-safe structural clone of a host graph
//! into a transmissible [`Surface`]: a preorder walk over the object graph,
//! deduplicating nodes by `Rc` pointer identity. An object reachable twice
//! is emitted once and referenced by index; cycles terminate because an
//! object's index is recorded before its members are visited.
//!
//! [`resolve_method`] is the inverse concern at call time: walk the local
//! graph by a path received in a `Request` and hand back the bound method.

use std::collections::HashMap;
use std::rc::Rc;

use crate::fault::Fault;
use crate::surface::host::{HostMember, HostMethod, HostObject};
use crate::wire::{Surface, SurfaceMember, SurfaceNode};

/// Structurally serialize a host graph, preserving nesting, plain data, and
/// sharing. Node 0 of the result is `root`.
pub fn describe(root: &Rc<HostObject>) -> Surface {
    let mut nodes: Vec<SurfaceNode> = Vec::new();
    let mut seen: HashMap<*const HostObject, usize> = HashMap::new();
    visit(root, &mut nodes, &mut seen);
    Surface::Tree { nodes }
}

fn visit(
    object: &Rc<HostObject>,
    nodes: &mut Vec<SurfaceNode>,
    seen: &mut HashMap<*const HostObject, usize>,
) -> usize {
    let key = Rc::as_ptr(object);
    if let Some(&index) = seen.get(&key) {
        return index;
    }

    // Reserve the slot before descending so cycles resolve to this index.
    let index = nodes.len();
    nodes.push(SurfaceNode {
        members: Default::default(),
    });
    seen.insert(key, index);

    let mut members = std::collections::BTreeMap::new();
    for (name, member) in object.snapshot() {
        let described = match member {
            HostMember::Data(value) => SurfaceMember::Data { value },
            HostMember::Method(_) => SurfaceMember::Method,
            HostMember::Object(child) => SurfaceMember::Object {
                node: visit(&child, nodes, seen),
            },
        };
        members.insert(name, described);
    }
    nodes[index].members = members;
    index
}

/// Serialize only the callable member names at the root: the flat handshake
/// encoding. Nested objects and plain data are not advertised.
pub fn describe_flat(root: &Rc<HostObject>) -> Surface {
    let names = root
        .snapshot()
        .into_iter()
        .filter_map(|(name, member)| match member {
            HostMember::Method(_) => Some(name),
            _ => None,
        })
        .collect();
    Surface::Flat(names)
}

/// Walk the host graph by `path` and return the method at its end.
///
/// Each step makes the current object the receiver and the named member the
/// next value. Any unresolvable step produces a descriptive fault, which the
/// dispatcher sends back as a Reject — never a crash.
pub(crate) fn resolve_method(
    root: &Rc<HostObject>,
    path: &[String],
) -> Result<Rc<HostMethod>, Fault> {
    if path.is_empty() {
        return Err(Fault::new("empty request path"));
    }

    let mut current = Rc::clone(root);
    for (depth, name) in path.iter().enumerate() {
        let at = || path[..=depth].join(".");
        let member = current
            .member(name)
            .ok_or_else(|| Fault::new(format!("no member at path {}", at())))?;

        let last = depth == path.len() - 1;
        match member {
            HostMember::Method(method) if last => return Ok(method),
            HostMember::Method(_) => {
                return Err(Fault::new(format!(
                    "member at path {} is a method, not an object",
                    at()
                )));
            }
            HostMember::Object(child) if !last => current = child,
            HostMember::Object(_) => {
                return Err(Fault::new(format!(
                    "member at path {} is an object, not callable",
                    at()
                )));
            }
            HostMember::Data(_) => {
                return Err(Fault::new(format!(
                    "member at path {} is plain data, not callable",
                    at()
                )));
            }
        }
    }
    unreachable!("loop returns on the last path segment")
}
