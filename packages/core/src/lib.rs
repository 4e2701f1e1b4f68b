pub mod attr;
pub mod build_in;
pub mod build_out;
pub mod cache;
pub mod comp_key;
pub mod component;
pub mod error;
pub mod event;
pub mod position;
pub mod vnode;




pub use attr::{AttrValue, AttributeLister};
pub use build_in::{downcast_wire, BuildIn, WireFn};
pub use build_out::BuildOutput;
pub use cache::ComponentCache;
pub use comp_key::{make_comp_key_id, CompKey, IterKey};
pub use component::{component, Component, ComponentId, ComponentRef, LifecycleCtx, RenderedCtx};
pub use error::{TreeError, TreeResult};
pub use event::DomEvent;
pub use position::hash_position;
pub use vnode::{
    DomEventHandlerSpec, ElementCallback, ElementHandle, NodeArena, NodeId, NodeKind,
    VAttribute, VNode, VProperty,
};
