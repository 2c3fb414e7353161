use uuid::Uuid;

use super::principal::{Principal, ResourceRef};
use super::{Action, ResourceKind, Role};

/// Scoping predicate attached to a grant in the policy matrix.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Scope {
    /// No restriction beyond the grant itself (SuperAdmin, public creates).
    Any,
    /// Resource branch must equal the principal's home branch.
    HomeBranch,
    /// JobResponse rule: parent job branch must match the home branch AND the
    /// parent job must have been created by the principal.
    OwnedJob,
    /// Resource's owning user account must be the principal.
    SelfRecord,
    /// Active job postings only.
    ActiveOnly,
    /// Published blog posts only.
    PublishedOnly,
}

impl Scope {
    pub fn matches(&self, principal: Option<&Principal>, resource: &ResourceRef) -> bool {
        self.matches_parts(
            principal.map(|p| p.user_id),
            principal.and_then(|p| p.home_branch),
            resource,
        )
    }

    /// Scoping only ever looks at the principal's identity and home branch;
    /// the role already selected the grant.
    fn matches_parts(
        &self,
        user_id: Option<Uuid>,
        home_branch: Option<Uuid>,
        resource: &ResourceRef,
    ) -> bool {
        match self {
            Scope::Any => true,
            Scope::HomeBranch => match home_branch {
                Some(branch) => resource.branch_id == Some(branch),
                // No home branch resolved: fail closed.
                None => false,
            },
            Scope::OwnedJob => match (user_id, home_branch) {
                (Some(user), Some(branch)) => {
                    resource.branch_id == Some(branch) && resource.created_by == Some(user)
                }
                _ => false,
            },
            Scope::SelfRecord => match user_id {
                Some(user) => resource.owner_user_id == Some(user),
                None => false,
            },
            Scope::ActiveOnly => resource.is_active,
            Scope::PublishedOnly => resource.is_published,
        }
    }
}

/// One row of the policy matrix: a role (or the anonymous public when
/// `None`) gets `actions` on `resource`, scoped by `scope`.
struct Grant {
    role: Option<Role>,
    resource: ResourceKind,
    actions: &'static [Action],
    scope: Scope,
}

const CRUD: &[Action] = &[Action::Create, Action::Read, Action::Update, Action::Delete];
const CRU: &[Action] = &[Action::Create, Action::Read, Action::Update];
const CR: &[Action] = &[Action::Create, Action::Read];
const C: &[Action] = &[Action::Create];
const R: &[Action] = &[Action::Read];

const fn grant(role: Role, resource: ResourceKind, actions: &'static [Action], scope: Scope) -> Grant {
    Grant {
        role: Some(role),
        resource,
        actions,
        scope,
    }
}

const fn public(resource: ResourceKind, actions: &'static [Action], scope: Scope) -> Grant {
    Grant {
        role: None,
        resource,
        actions,
        scope,
    }
}

/// The canonical policy matrix. Grants compose with logical OR: access is
/// allowed when ANY matching grant's scope matches. Everything absent from
/// this table is denied.
///
/// Deliberate asymmetries: Lead has no delete grant below SuperAdmin, and
/// JobResponse management for managers requires job ownership on top of the
/// branch match.
static MATRIX: &[Grant] = &[
    // SuperAdmin: unrestricted on every resource type.
    grant(Role::SuperAdmin, ResourceKind::User, CRUD, Scope::Any),
    grant(Role::SuperAdmin, ResourceKind::Branch, CRUD, Scope::Any),
    grant(Role::SuperAdmin, ResourceKind::Employee, CRUD, Scope::Any),
    grant(Role::SuperAdmin, ResourceKind::Student, CRUD, Scope::Any),
    grant(Role::SuperAdmin, ResourceKind::Lead, CRUD, Scope::Any),
    grant(Role::SuperAdmin, ResourceKind::Job, CRUD, Scope::Any),
    grant(Role::SuperAdmin, ResourceKind::JobResponse, CRUD, Scope::Any),
    grant(Role::SuperAdmin, ResourceKind::Blog, CRUD, Scope::Any),
    grant(Role::SuperAdmin, ResourceKind::Attendance, CRUD, Scope::Any),
    // BranchManager: full control inside the home branch, except leads
    // (no delete) and job responses (ownership required).
    grant(Role::BranchManager, ResourceKind::User, R, Scope::HomeBranch),
    grant(Role::BranchManager, ResourceKind::User, R, Scope::SelfRecord),
    grant(Role::BranchManager, ResourceKind::Branch, R, Scope::HomeBranch),
    grant(Role::BranchManager, ResourceKind::Employee, CRUD, Scope::HomeBranch),
    grant(Role::BranchManager, ResourceKind::Student, CRUD, Scope::HomeBranch),
    grant(Role::BranchManager, ResourceKind::Lead, CRU, Scope::HomeBranch),
    grant(Role::BranchManager, ResourceKind::Job, CRUD, Scope::HomeBranch),
    grant(Role::BranchManager, ResourceKind::JobResponse, CRUD, Scope::OwnedJob),
    grant(Role::BranchManager, ResourceKind::Blog, CRUD, Scope::HomeBranch),
    grant(Role::BranchManager, ResourceKind::Attendance, CRU, Scope::HomeBranch),
    // Counsellor
    grant(Role::Counsellor, ResourceKind::User, R, Scope::HomeBranch),
    grant(Role::Counsellor, ResourceKind::User, R, Scope::SelfRecord),
    grant(Role::Counsellor, ResourceKind::Branch, R, Scope::HomeBranch),
    grant(Role::Counsellor, ResourceKind::Employee, R, Scope::HomeBranch),
    grant(Role::Counsellor, ResourceKind::Student, CRU, Scope::HomeBranch),
    grant(Role::Counsellor, ResourceKind::Lead, CRU, Scope::HomeBranch),
    grant(Role::Counsellor, ResourceKind::Attendance, R, Scope::HomeBranch),
    // Receptionist
    grant(Role::Receptionist, ResourceKind::User, R, Scope::HomeBranch),
    grant(Role::Receptionist, ResourceKind::User, R, Scope::SelfRecord),
    grant(Role::Receptionist, ResourceKind::Branch, R, Scope::HomeBranch),
    grant(Role::Receptionist, ResourceKind::Employee, R, Scope::HomeBranch),
    grant(Role::Receptionist, ResourceKind::Student, CR, Scope::HomeBranch),
    grant(Role::Receptionist, ResourceKind::Lead, CR, Scope::HomeBranch),
    grant(Role::Receptionist, ResourceKind::Attendance, R, Scope::HomeBranch),
    // BankManager: account access only.
    grant(Role::BankManager, ResourceKind::User, R, Scope::SelfRecord),
    // Student
    grant(Role::Student, ResourceKind::User, R, Scope::SelfRecord),
    grant(Role::Student, ResourceKind::Student, R, Scope::SelfRecord),
    grant(Role::Student, ResourceKind::Job, R, Scope::ActiveOnly),
    grant(Role::Student, ResourceKind::JobResponse, C, Scope::Any),
    grant(Role::Student, ResourceKind::JobResponse, R, Scope::SelfRecord),
    grant(Role::Student, ResourceKind::Blog, R, Scope::PublishedOnly),
    // Unauthenticated public surface
    public(ResourceKind::Job, R, Scope::ActiveOnly),
    public(ResourceKind::JobResponse, C, Scope::Any),
    public(ResourceKind::Blog, R, Scope::PublishedOnly),
];

fn grants_for(
    principal: Option<&Principal>,
    action: Action,
    resource: ResourceKind,
) -> impl Iterator<Item = &'static Grant> {
    let role = principal.map(|p| p.role);
    MATRIX.iter().filter(move |g| {
        g.role == role && g.resource == resource && g.actions.contains(&action)
    })
}

/// Coarse (request-level) check: may this principal attempt `action` on
/// `resource` at all? Branch and ownership scoping is applied later, against
/// the loaded record.
pub fn can_perform(principal: Option<&Principal>, action: Action, resource: ResourceKind) -> bool {
    let allowed = grants_for(principal, action, resource).next().is_some();
    if !allowed {
        tracing::debug!(
            role = principal.map(|p| p.role.as_str()).unwrap_or("anonymous"),
            action = action.as_str(),
            resource = resource.as_str(),
            "coarse permission denied"
        );
    }
    allowed
}

/// Fine-grained (object-level) check against one loaded record. Grants
/// compose with logical OR; the first grant whose scope matches wins.
pub fn can_access(principal: Option<&Principal>, action: Action, resource: &ResourceRef) -> bool {
    let Some(kind) = resource.kind else {
        return false;
    };

    let allowed =
        grants_for(principal, action, kind).any(|g| g.scope.matches(principal, resource));
    if !allowed {
        tracing::debug!(
            role = principal.map(|p| p.role.as_str()).unwrap_or("anonymous"),
            action = action.as_str(),
            resource = kind.as_str(),
            "object permission denied"
        );
    }
    allowed
}

/// Human-readable denial reason for a coarse or fine-grained deny.
pub fn deny_reason(principal: Option<&Principal>, action: Action, resource: ResourceKind) -> String {
    match principal {
        Some(p) => format!(
            "role {} may not {} {}",
            p.role,
            action.as_str(),
            resource.as_str()
        ),
        None => format!("authentication required to {} {}", action.as_str(), resource.as_str()),
    }
}

/// The read grants for `(principal, resource)`, reusable both as an
/// in-memory predicate and as the filter a list query applies. For all
/// records `r`: `filter.matches(&r)` iff `can_access(principal, Read, &r)`.
#[derive(Debug, Clone)]
pub struct ScopeFilter {
    scopes: Vec<Scope>,
    user_id: Option<Uuid>,
    home_branch: Option<Uuid>,
}

impl ScopeFilter {
    /// No read grant at all: the list itself should be refused, not emptied.
    pub fn is_deny_all(&self) -> bool {
        self.scopes.is_empty()
    }

    pub fn matches(&self, resource: &ResourceRef) -> bool {
        self.scopes
            .iter()
            .any(|scope| scope.matches_parts(self.user_id, self.home_branch, resource))
    }
}

/// Query-scoping layer: the predicate a list endpoint must apply before
/// returning rows of `resource`.
pub fn read_scopes(principal: Option<&Principal>, resource: ResourceKind) -> ScopeFilter {
    let mut scopes: Vec<Scope> = Vec::new();
    for g in grants_for(principal, Action::Read, resource) {
        if !scopes.contains(&g.scope) {
            scopes.push(g.scope);
        }
    }

    ScopeFilter {
        scopes,
        user_id: principal.map(|p| p.user_id),
        home_branch: principal.and_then(|p| p.home_branch),
    }
}
