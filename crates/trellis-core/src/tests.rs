//! Unit tests for trellis-core

use super::*;
use chrono::{Duration, Utc};

// =============================================================================
// Model Tests
// =============================================================================

#[cfg(test)]
mod model_tests {
    use super::*;

    #[test]
    fn test_provider_kind_serialization() {
        let json = serde_json::to_string(&ProviderKind::Azure).unwrap();
        assert_eq!(json, "\"azure\"");
        assert_eq!("okta".parse::<ProviderKind>().unwrap(), ProviderKind::Okta);
        assert!("ldap".parse::<ProviderKind>().is_err());
    }

    #[test]
    fn test_provider_secret_not_serialized() {
        let provider = Provider::new("corp", ProviderKind::Oidc, "https://idp", "cid", "s3cret");
        let json = serde_json::to_string(&provider).unwrap();
        assert!(!json.contains("s3cret"));
    }

    #[test]
    fn test_token_bundle_debug_redacts() {
        let tokens = TokenBundle {
            access_token: "at-123".into(),
            refresh_token: "rt-456".into(),
            expires_at: None,
        };
        let debug = format!("{:?}", tokens);
        assert!(!debug.contains("at-123"));
        assert!(!debug.contains("rt-456"));
    }

    #[test]
    fn test_token_freshness_respects_leeway() {
        let now = Utc::now();
        let tokens = TokenBundle {
            access_token: "at".into(),
            refresh_token: "rt".into(),
            expires_at: Some(now + Duration::seconds(30)),
        };
        assert!(tokens.is_fresh(now, Duration::seconds(10)));
        assert!(!tokens.is_fresh(now, Duration::seconds(60)));

        let empty = TokenBundle::default();
        assert!(!empty.is_fresh(now, Duration::zero()));
    }

    #[test]
    fn test_identity_group_names() {
        let mut identity = Identity::new("alice@example.com");
        identity.groups = vec![Group::new("b"), Group::new("a")];
        let names: Vec<String> = identity.group_names().into_iter().collect();
        assert_eq!(names, vec!["a", "b"]);
    }

    #[test]
    fn test_pagination_offset() {
        assert_eq!(Pagination::new(1, 10).offset(), 0);
        assert_eq!(Pagination::new(3, 10).offset(), 20);
        assert!(Pagination::default().is_unbounded());
    }

    #[test]
    fn test_pagination_offset_does_not_overflow() {
        assert_eq!(
            Pagination::new(u32::MAX, 2).offset(),
            2 * (u64::from(u32::MAX) - 1)
        );
        assert_eq!(
            Pagination::new(u32::MAX, u32::MAX).offset(),
            u64::from(u32::MAX) * (u64::from(u32::MAX) - 1)
        );
    }
}

// =============================================================================
// Error Tests
// =============================================================================

#[cfg(test)]
mod error_tests {
    use super::*;

    #[test]
    fn test_policy_violation_lists_all_requirements() {
        let err = TrellisError::policy_violation(vec![
            "needs minimum length of 10".into(),
            "needs minimum 1 symbols".into(),
        ]);
        assert_eq!(
            err.to_string(),
            "password does not pass requirements: needs minimum length of 10, needs minimum 1 symbols"
        );
    }

    #[test]
    fn test_error_predicates() {
        assert!(TrellisError::not_found("identity", "x").is_not_found());
        assert!(TrellisError::conflict("group", "admins").is_conflict());
        assert!(!TrellisError::internal_error("boom").is_conflict());
    }

    #[test]
    fn test_validation_errors_convert() {
        let mut v = Validator::new();
        v.required("code", "");
        let err: TrellisError = v.finish().unwrap_err().into();
        assert!(matches!(err, TrellisError::Validation(_)));
    }
}

// =============================================================================
// Filter Tests
// =============================================================================

#[cfg(test)]
mod filter_tests {
    use super::*;

    fn provider_user(expires_in: Option<i64>) -> ProviderUser {
        let mut pu = ProviderUser::new(IdentityId::new(), ProviderId::new(), "a@example.com");
        pu.tokens.expires_at = expires_in.map(|s| Utc::now() + Duration::seconds(s));
        pu
    }

    #[test]
    fn test_selectors_are_conjunctive() {
        let group = Group::new("admins");
        let now = Utc::now();
        assert!(Filter::new().by_name("admins").matches(&group, now));
        assert!(Filter::new().by_name("admins").by_id(group.id).matches(&group, now));
        assert!(!Filter::new().by_name("admins").by_id(GroupId::new()).matches(&group, now));
    }

    #[test]
    fn test_missing_field_never_matches() {
        let group = Group::new("admins");
        assert!(!Filter::new()
            .by_provider(ProviderId::new())
            .matches(&group, Utc::now()));
    }

    #[test]
    fn test_not_expired() {
        let records = vec![provider_user(Some(60)), provider_user(Some(-60)), provider_user(None)];
        let kept = Filter::new().not_expired().apply(records);
        assert_eq!(kept.len(), 2);
    }

    #[test]
    fn test_order_and_paginate() {
        let groups = vec![Group::new("c"), Group::new("a"), Group::new("d"), Group::new("b")];
        let page = Filter::new()
            .order_by(OrderBy::Name)
            .paginate(Pagination::new(2, 2))
            .apply(groups);
        let names: Vec<&str> = page.iter().map(|g| g.name.as_str()).collect();
        assert_eq!(names, vec!["c", "d"]);
    }

    #[test]
    fn test_page_past_the_end_is_empty() {
        let groups = vec![Group::new("a"), Group::new("b")];
        let page = Filter::new()
            .paginate(Pagination::new(u32::MAX, u32::MAX))
            .apply(groups);
        assert!(page.is_empty());
    }
}
