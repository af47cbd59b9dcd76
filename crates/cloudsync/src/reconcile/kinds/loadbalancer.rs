use async_trait::async_trait;

use super::{child_scope, region_scope, resolve_optional};
use crate::cloud::{
    CloudLbAcl, CloudLbBackend, CloudLbBackendGroup, CloudLbCertificate, CloudLbListener,
    CloudLbListenerRule, CloudLoadbalancer,
};
use crate::model::{
    Cloudregion, Guest, Loadbalancer, LoadbalancerAcl, LoadbalancerBackend,
    LoadbalancerBackendGroup, LoadbalancerCertificate, LoadbalancerListener,
    LoadbalancerListenerRule, Record,
};
use crate::reconcile::{ReconcileError, SyncContext, SyncKind};
use crate::store::{ChildRef, Scope};

pub struct LbAclKind;

#[async_trait]
impl SyncKind for LbAclKind {
    type Local = LoadbalancerAcl;
    type Remote = dyn CloudLbAcl;
    type Parent = Cloudregion;
    type Refs = ();

    const DELETE_GUARDS: &'static [ChildRef] =
        &[ChildRef::new(LoadbalancerListener::KIND, "acl_id")];

    fn scope(&self, region: &Cloudregion, ctx: &SyncContext) -> Scope {
        region_scope(ctx, region.id())
    }

    fn create(
        &self,
        remote: &Self::Remote,
        region: &Cloudregion,
        _: &(),
        ctx: &SyncContext,
    ) -> LoadbalancerAcl {
        LoadbalancerAcl {
            base: ctx.new_base(remote),
            cloudregion_id: region.id().to_string(),
            entries: remote.entries(),
        }
    }

    fn update(&self, local: &mut LoadbalancerAcl, remote: &Self::Remote, region: &Cloudregion, _: &()) {
        local.cloudregion_id = region.id().to_string();
        local.entries = remote.entries();
    }
}

pub struct LbCertificateKind;

#[async_trait]
impl SyncKind for LbCertificateKind {
    type Local = LoadbalancerCertificate;
    type Remote = dyn CloudLbCertificate;
    type Parent = Cloudregion;
    type Refs = ();

    const DELETE_GUARDS: &'static [ChildRef] =
        &[ChildRef::new(LoadbalancerListener::KIND, "certificate_id")];

    fn scope(&self, region: &Cloudregion, ctx: &SyncContext) -> Scope {
        region_scope(ctx, region.id())
    }

    fn create(
        &self,
        remote: &Self::Remote,
        region: &Cloudregion,
        _: &(),
        ctx: &SyncContext,
    ) -> LoadbalancerCertificate {
        let mut cert = LoadbalancerCertificate {
            base: ctx.new_base(remote),
            ..Default::default()
        };
        self.update(&mut cert, remote, region, &());
        cert
    }

    fn update(
        &self,
        local: &mut LoadbalancerCertificate,
        remote: &Self::Remote,
        region: &Cloudregion,
        _: &(),
    ) {
        local.cloudregion_id = region.id().to_string();
        local.fingerprint = remote.fingerprint();
        local.common_name = remote.common_name();
        local.not_after = remote.not_after();
    }
}

pub struct LoadbalancerKind;

#[async_trait]
impl SyncKind for LoadbalancerKind {
    type Local = Loadbalancer;
    type Remote = dyn CloudLoadbalancer;
    type Parent = Cloudregion;
    type Refs = ();

    // Rules and backends first, they reference listeners and groups.
    const OWNED_CHILDREN: &'static [ChildRef] = &[
        ChildRef::new(LoadbalancerListenerRule::KIND, "loadbalancer_id"),
        ChildRef::new(LoadbalancerListener::KIND, "loadbalancer_id"),
        ChildRef::new(LoadbalancerBackend::KIND, "loadbalancer_id"),
        ChildRef::new(LoadbalancerBackendGroup::KIND, "loadbalancer_id"),
    ];

    fn scope(&self, region: &Cloudregion, ctx: &SyncContext) -> Scope {
        region_scope(ctx, region.id())
    }

    fn create(
        &self,
        remote: &Self::Remote,
        region: &Cloudregion,
        _: &(),
        ctx: &SyncContext,
    ) -> Loadbalancer {
        let mut lb = Loadbalancer {
            base: ctx.new_base(remote),
            ..Default::default()
        };
        self.update(&mut lb, remote, region, &());
        lb
    }

    fn update(&self, local: &mut Loadbalancer, remote: &Self::Remote, region: &Cloudregion, _: &()) {
        local.cloudregion_id = region.id().to_string();
        local.address = remote.address();
        local.address_type = remote.address_type();
    }
}

pub struct LbBackendGroupKind;

#[async_trait]
impl SyncKind for LbBackendGroupKind {
    type Local = LoadbalancerBackendGroup;
    type Remote = dyn CloudLbBackendGroup;
    type Parent = Loadbalancer;
    type Refs = ();

    const OWNED_CHILDREN: &'static [ChildRef] =
        &[ChildRef::new(LoadbalancerBackend::KIND, "backend_group_id")];

    fn scope(&self, lb: &Loadbalancer, ctx: &SyncContext) -> Scope {
        child_scope(ctx, "loadbalancer_id", lb.id())
    }

    fn create(
        &self,
        remote: &Self::Remote,
        lb: &Loadbalancer,
        _: &(),
        ctx: &SyncContext,
    ) -> LoadbalancerBackendGroup {
        LoadbalancerBackendGroup {
            base: ctx.new_base(remote),
            loadbalancer_id: lb.id().to_string(),
            group_type: remote.group_type(),
        }
    }

    fn update(
        &self,
        local: &mut LoadbalancerBackendGroup,
        remote: &Self::Remote,
        lb: &Loadbalancer,
        _: &(),
    ) {
        local.loadbalancer_id = lb.id().to_string();
        local.group_type = remote.group_type();
    }
}

pub struct LbBackendKind;

#[async_trait]
impl SyncKind for LbBackendKind {
    type Local = LoadbalancerBackend;
    type Remote = dyn CloudLbBackend;
    type Parent = LoadbalancerBackendGroup;
    /// Local id of the backing guest, empty if it is not synced.
    type Refs = String;

    fn scope(&self, group: &LoadbalancerBackendGroup, ctx: &SyncContext) -> Scope {
        child_scope(ctx, "backend_group_id", group.id())
    }

    async fn resolve(
        &self,
        remote: &Self::Remote,
        _group: &LoadbalancerBackendGroup,
        ctx: &SyncContext,
    ) -> Result<String, ReconcileError> {
        resolve_optional::<Guest>(ctx, remote.backend_id()).await
    }

    fn create(
        &self,
        remote: &Self::Remote,
        group: &LoadbalancerBackendGroup,
        guest_id: &String,
        ctx: &SyncContext,
    ) -> LoadbalancerBackend {
        let mut backend = LoadbalancerBackend {
            base: ctx.new_base(remote),
            ..Default::default()
        };
        self.update(&mut backend, remote, group, guest_id);
        backend
    }

    fn update(
        &self,
        local: &mut LoadbalancerBackend,
        remote: &Self::Remote,
        group: &LoadbalancerBackendGroup,
        guest_id: &String,
    ) {
        local.loadbalancer_id = group.loadbalancer_id.clone();
        local.backend_group_id = group.id().to_string();
        local.backend_id = guest_id.clone();
        local.port = remote.port();
        local.weight = remote.weight();
    }
}

#[derive(Debug, Default)]
pub struct ListenerRefs {
    pub backend_group_id: String,
    pub acl_id: String,
    pub certificate_id: String,
}

pub struct LbListenerKind;

#[async_trait]
impl SyncKind for LbListenerKind {
    type Local = LoadbalancerListener;
    type Remote = dyn CloudLbListener;
    type Parent = Loadbalancer;
    type Refs = ListenerRefs;

    const OWNED_CHILDREN: &'static [ChildRef] =
        &[ChildRef::new(LoadbalancerListenerRule::KIND, "listener_id")];

    fn scope(&self, lb: &Loadbalancer, ctx: &SyncContext) -> Scope {
        child_scope(ctx, "loadbalancer_id", lb.id())
    }

    async fn resolve(
        &self,
        remote: &Self::Remote,
        _lb: &Loadbalancer,
        ctx: &SyncContext,
    ) -> Result<ListenerRefs, ReconcileError> {
        Ok(ListenerRefs {
            backend_group_id: resolve_optional::<LoadbalancerBackendGroup>(
                ctx,
                remote.backend_group_id(),
            )
            .await?,
            acl_id: resolve_optional::<LoadbalancerAcl>(ctx, remote.acl_id()).await?,
            certificate_id: resolve_optional::<LoadbalancerCertificate>(
                ctx,
                remote.certificate_id(),
            )
            .await?,
        })
    }

    fn create(
        &self,
        remote: &Self::Remote,
        lb: &Loadbalancer,
        refs: &ListenerRefs,
        ctx: &SyncContext,
    ) -> LoadbalancerListener {
        let mut listener = LoadbalancerListener {
            base: ctx.new_base(remote),
            ..Default::default()
        };
        self.update(&mut listener, remote, lb, refs);
        listener
    }

    fn update(
        &self,
        local: &mut LoadbalancerListener,
        remote: &Self::Remote,
        lb: &Loadbalancer,
        refs: &ListenerRefs,
    ) {
        local.loadbalancer_id = lb.id().to_string();
        local.listener_type = remote.protocol();
        local.listener_port = remote.port();
        local.backend_group_id = refs.backend_group_id.clone();
        local.acl_id = refs.acl_id.clone();
        local.certificate_id = refs.certificate_id.clone();
    }
}

pub struct LbListenerRuleKind;

#[async_trait]
impl SyncKind for LbListenerRuleKind {
    type Local = LoadbalancerListenerRule;
    type Remote = dyn CloudLbListenerRule;
    type Parent = LoadbalancerListener;
    /// Local backend group id.
    type Refs = String;

    fn scope(&self, listener: &LoadbalancerListener, ctx: &SyncContext) -> Scope {
        child_scope(ctx, "listener_id", listener.id())
    }

    async fn resolve(
        &self,
        remote: &Self::Remote,
        _listener: &LoadbalancerListener,
        ctx: &SyncContext,
    ) -> Result<String, ReconcileError> {
        resolve_optional::<LoadbalancerBackendGroup>(ctx, remote.backend_group_id()).await
    }

    fn create(
        &self,
        remote: &Self::Remote,
        listener: &LoadbalancerListener,
        group_id: &String,
        ctx: &SyncContext,
    ) -> LoadbalancerListenerRule {
        let mut rule = LoadbalancerListenerRule {
            base: ctx.new_base(remote),
            ..Default::default()
        };
        self.update(&mut rule, remote, listener, group_id);
        rule
    }

    fn update(
        &self,
        local: &mut LoadbalancerListenerRule,
        remote: &Self::Remote,
        listener: &LoadbalancerListener,
        group_id: &String,
    ) {
        local.loadbalancer_id = listener.loadbalancer_id.clone();
        local.listener_id = listener.id().to_string();
        local.domain = remote.domain();
        local.path = remote.path();
        local.backend_group_id = group_id.clone();
    }
}
