//! Access policy evaluation
//!
//! The single visibility predicate for the whole system, expressed as a pure
//! function so it can run both at write-validation time and as the read-side
//! filter over cache rows. Keeping the rule in one place closes the window
//! where a stale or partially rebuilt cache row could leak a private recipe:
//! even if such a row exists, it is re-checked here before it is served.

use crate::{normalize_email, Recipe, Requester, ShareGrant};

/// Decide whether `requester` may view `recipe` given its current grants.
///
/// True iff the requester owns the recipe, or some grant is public, or some
/// grant names the requester's email (case-insensitive).
pub fn can_view(recipe: &Recipe, grants: &[ShareGrant], requester: &Requester) -> bool {
    if requester.user_id == recipe.owner_id {
        return true;
    }
    let email = normalize_email(&requester.email);
    grants
        .iter()
        .filter(|g| g.recipe_id == recipe.recipe_id)
        .any(|g| g.is_public || g.grantee_email.as_deref() == Some(email.as_str()))
}


#[cfg(test)]
mod prop_tests {
    use super::*;
    use proptest::prelude::*;
    use uuid::Uuid;

    proptest! {
        #![proptest_config(ProptestConfig::with_cases(100))]

        /// A non-owner with no public grant and no matching email grant is
        /// never allowed, regardless of how many unrelated grants exist.
        #[test]
        fn prop_no_matching_grant_never_leaks(
            other_emails in proptest::collection::vec("[a-z]{3,8}@[a-z]{3,8}\\.com", 0..5)
        ) {
            let recipe = Recipe::new(Uuid::now_v7(), "Secret");
            let grants: Vec<ShareGrant> = other_emails
                .iter()
                .map(|e| ShareGrant::for_email(recipe.recipe_id, recipe.owner_id, e))
                .collect();
            let requester = Requester::new(Uuid::now_v7(), "outsider@nowhere.org");

            prop_assert!(!can_view(&recipe, &grants, &requester));
        }

        /// A public grant admits any requester.
        #[test]
        fn prop_public_grant_admits_all(
            email in "[a-z]{3,8}@[a-z]{3,8}\\.com"
        ) {
            let recipe = Recipe::new(Uuid::now_v7(), "Open");
            let grants = vec![ShareGrant::public(recipe.recipe_id, recipe.owner_id)];
            let requester = Requester::new(Uuid::now_v7(), &email);

            prop_assert!(can_view(&recipe, &grants, &requester));
        }
    }
}
