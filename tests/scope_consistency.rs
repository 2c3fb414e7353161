//! Exhaustive consistency checks between the coarse check, the object-level
//! check and the list-query scope filter.

use uuid::Uuid;

use consult_admin::authz::{
    can_access, can_perform, read_scopes, Action, Principal, ResourceKind, ResourceRef, Role,
};

fn principals(me: Uuid, b1: Uuid, b2: Uuid) -> Vec<Option<Principal>> {
    let mut out = vec![None];
    for role in Role::ALL {
        for home in [None, Some(b1), Some(b2)] {
            out.push(Some(Principal::new(me, role, home)));
        }
    }
    out
}

fn resources(me: Uuid, other: Uuid, b1: Uuid, b2: Uuid) -> Vec<ResourceRef> {
    let mut out = Vec::new();
    for kind in ResourceKind::ALL {
        for branch_id in [Some(b1), Some(b2), None] {
            for created_by in [Some(me), Some(other), None] {
                for owner_user_id in [Some(me), Some(other), None] {
                    for (is_active, is_published) in
                        [(true, true), (true, false), (false, true), (false, false)]
                    {
                        out.push(ResourceRef {
                            kind: Some(kind),
                            branch_id,
                            created_by,
                            owner_user_id,
                            is_active,
                            is_published,
                        });
                    }
                }
            }
        }
    }
    out
}

/// For every principal and every resource shape, the list filter admits a
/// record exactly when the object-level read check would.
#[test]
fn list_filter_agrees_with_object_level_reads() {
    let me = Uuid::new_v4();
    let other = Uuid::new_v4();
    let b1 = Uuid::new_v4();
    let b2 = Uuid::new_v4();

    for principal in principals(me, b1, b2) {
        for resource in resources(me, other, b1, b2) {
            let kind = resource.kind.unwrap();
            let filter = read_scopes(principal.as_ref(), kind);

            assert_eq!(
                filter.matches(&resource),
                can_access(principal.as_ref(), Action::Read, &resource),
                "filter/object-check disagreement: principal {:?}, resource {:?}",
                principal,
                resource
            );
        }
    }
}

/// Object-level access always implies the coarse request-level check; a
/// denial at the door can never hide a grant behind it.
#[test]
fn object_access_implies_coarse_permission() {
    let me = Uuid::new_v4();
    let other = Uuid::new_v4();
    let b1 = Uuid::new_v4();
    let b2 = Uuid::new_v4();

    for principal in principals(me, b1, b2) {
        for resource in resources(me, other, b1, b2) {
            let kind = resource.kind.unwrap();
            for action in Action::ALL {
                if can_access(principal.as_ref(), action, &resource) {
                    assert!(
                        can_perform(principal.as_ref(), action, kind),
                        "fine-grained grant without coarse grant: {:?} {:?} {:?}",
                        principal,
                        action,
                        resource
                    );
                }
            }
        }
    }
}

/// SuperAdmin is never denied; anonymous callers never get past the public
/// read-only surface.
#[test]
fn matrix_extremes() {
    let me = Uuid::new_v4();
    let other = Uuid::new_v4();
    let b1 = Uuid::new_v4();
    let b2 = Uuid::new_v4();
    let admin = Principal::new(me, Role::SuperAdmin, None);

    for resource in resources(me, other, b1, b2) {
        for action in Action::ALL {
            assert!(can_access(Some(&admin), action, &resource));

            if can_access(None, action, &resource) {
                let kind = resource.kind.unwrap();
                let visible = matches!(
                    kind,
                    ResourceKind::Job | ResourceKind::Blog | ResourceKind::JobResponse
                );
                assert!(visible, "anonymous access leaked on {:?}", kind);
                assert_ne!(action, Action::Update);
                assert_ne!(action, Action::Delete);
            }
        }
    }
}
