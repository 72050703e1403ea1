//! Scope requirements of every protected endpoint.

use once_cell::sync::Lazy;

use crate::models::Component;
use crate::scopes::known::{
    CASE_CREATE, CASE_DELETE, CASE_READ, CASE_UPDATE, REGISTRY_READ, REGISTRY_WRITE, STATUS_CREATE,
};
use crate::services::{Action, EndpointPolicy};

pub static CASES: Lazy<EndpointPolicy> = Lazy::new(|| {
    EndpointPolicy::new(Component::Cases)
        .require(&[Action::List, Action::Read], &CASE_READ)
        .require(&[Action::Create], &CASE_CREATE)
        .require(&[Action::Update, Action::PartialUpdate], &CASE_UPDATE)
        .require(&[Action::Destroy], &CASE_DELETE)
});

pub static STATUSES: Lazy<EndpointPolicy> = Lazy::new(|| {
    EndpointPolicy::new(Component::Cases)
        .require(&[Action::List, Action::Read], &CASE_READ)
        .require(&[Action::Create], &STATUS_CREATE)
});

pub static REGISTRY: Lazy<EndpointPolicy> = Lazy::new(|| {
    EndpointPolicy::new(Component::Meta)
        .require(&[Action::List, Action::Read], &REGISTRY_READ)
        .require(
            &[
                Action::Create,
                Action::Update,
                Action::PartialUpdate,
                Action::Destroy,
            ],
            &REGISTRY_WRITE,
        )
});
