//! Service registration.
//!
//! A plugin serves some subset of the three CSI role facets.  The
//! [`ServiceRegistry`] holds the implementation registered for each facet;
//! calls addressed to a facet with nothing registered are answered with
//! [`CsiError::Unimplemented`](crate::error::CsiError::Unimplemented) by the
//! server.

use std::fmt;
use std::sync::Arc;

use crate::controller::CsiController;
use crate::error::DriverError;
use crate::identity::CsiIdentity;
use crate::node::CsiNode;

/// One independently addressable group of CSI methods.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Facet {
    Identity,
    Controller,
    Node,
}

impl Facet {
    /// Service name in the CSI contract, e.g. `csi.v1.Controller`.
    pub fn service_name(self) -> &'static str {
        match self {
            Self::Identity => "csi.v1.Identity",
            Self::Controller => "csi.v1.Controller",
            Self::Node => "csi.v1.Node",
        }
    }
}

impl fmt::Display for Facet {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.service_name())
    }
}

/// A set of facets.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct FacetSet {
    identity: bool,
    controller: bool,
    node: bool,
}

impl FacetSet {
    /// No facets.
    pub const EMPTY: Self = Self {
        identity: false,
        controller: false,
        node: false,
    };

    /// Identity + Controller: a plugin that only manages volumes centrally.
    pub const CONTROL_PLANE: Self = Self::EMPTY.with(Facet::Identity).with(Facet::Controller);

    /// `self` plus `facet`.
    pub const fn with(self, facet: Facet) -> Self {
        match facet {
            Facet::Identity => Self {
                identity: true,
                ..self
            },
            Facet::Controller => Self {
                controller: true,
                ..self
            },
            Facet::Node => Self { node: true, ..self },
        }
    }

    pub const fn contains(self, facet: Facet) -> bool {
        match facet {
            Facet::Identity => self.identity,
            Facet::Controller => self.controller,
            Facet::Node => self.node,
        }
    }

    /// Members in contract order.
    pub fn iter(self) -> impl Iterator<Item = Facet> {
        [Facet::Identity, Facet::Controller, Facet::Node]
            .into_iter()
            .filter(move |f| self.contains(*f))
    }
}

/// Facet implementations attached to a server.
#[derive(Default)]
pub struct ServiceRegistry {
    identity: Option<Arc<dyn CsiIdentity>>,
    controller: Option<Arc<dyn CsiController>>,
    node: Option<Arc<dyn CsiNode>>,
}

impl ServiceRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn register_identity(&mut self, svc: Arc<dyn CsiIdentity>) -> Result<(), DriverError> {
        Self::register(&mut self.identity, svc, Facet::Identity)
    }

    pub fn register_controller(
        &mut self,
        svc: Arc<dyn CsiController>,
    ) -> Result<(), DriverError> {
        Self::register(&mut self.controller, svc, Facet::Controller)
    }

    pub fn register_node(&mut self, svc: Arc<dyn CsiNode>) -> Result<(), DriverError> {
        Self::register(&mut self.node, svc, Facet::Node)
    }

    fn register<T: ?Sized>(
        slot: &mut Option<Arc<T>>,
        svc: Arc<T>,
        facet: Facet,
    ) -> Result<(), DriverError> {
        if slot.is_some() {
            return Err(DriverError::config(format!(
                "service {facet} is already registered"
            )));
        }
        *slot = Some(svc);
        Ok(())
    }

    pub fn identity(&self) -> Option<&Arc<dyn CsiIdentity>> {
        self.identity.as_ref()
    }

    pub fn controller(&self) -> Option<&Arc<dyn CsiController>> {
        self.controller.as_ref()
    }

    pub fn node(&self) -> Option<&Arc<dyn CsiNode>> {
        self.node.as_ref()
    }

    /// The facets that currently have an implementation.
    pub fn facets(&self) -> FacetSet {
        let mut set = FacetSet::EMPTY;
        if self.identity.is_some() {
            set = set.with(Facet::Identity);
        }
        if self.controller.is_some() {
            set = set.with(Facet::Controller);
        }
        if self.node.is_some() {
            set = set.with(Facet::Node);
        }
        set
    }
}

impl fmt::Debug for ServiceRegistry {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ServiceRegistry")
            .field("facets", &self.facets())
            .finish()
    }
}
