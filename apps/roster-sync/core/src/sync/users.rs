//! User phases: fetch (P1), delta computation (P2), apply + cache (P3)

use super::SyncEngine;
use crate::cache::UserCacheEntry;
use crate::delta::{UserCreate, UserDelta, UserSkip, UserSuspend, UserUpdate};
use std::collections::{HashMap, HashSet};
use sync_common::{
    IdpUser, LmsUserPatch, NewLmsUser, SyncPhase, SyncResult,
};

/// Usernames never suspended by the engine
const PROTECTED_USERNAMES: &[&str] = &["admin", "guest"];

impl SyncEngine {
    /// P1: drain the IdP's user list
    pub(crate) async fn fetch_users(&mut self) -> SyncResult<()> {
        let phase = SyncPhase::FetchUsers;
        let total = self.deps.idp.count_users().await.ok().unwrap_or(0) as u64;
        self.publish(phase, "fetching users", 0, total).await?;

        let page_size = self.config.page_size;
        let mut first = 0;
        loop {
            let page = self.deps.idp.list_users(first, page_size).await?;
            let fetched = page.len();
            first += fetched;
            self.idp_users.extend(page);

            // Progress every 100 fetched and on the final short page
            if fetched < page_size || self.idp_users.len() % 100 == 0 {
                self.publish(
                    phase,
                    format!("fetched {} users", self.idp_users.len()),
                    self.idp_users.len() as u64,
                    total,
                )
                .await?;
            }
            if fetched < page_size {
                break;
            }
        }

        log::info!("fetched {} users from identity provider", self.idp_users.len());
        Ok(())
    }

    /// P2: partition IdP users into create/update/skip, and optionally
    /// flag previously synchronized users for suspension
    pub(crate) async fn compute_user_delta(&mut self) -> SyncResult<()> {
        let phase = SyncPhase::ComputeUserDelta;
        let lms_users = self.deps.users.list_active_users().await?;

        let by_email: HashMap<&str, &sync_common::LmsUser> =
            lms_users.iter().map(|u| (u.email.as_str(), u)).collect();
        let by_username: HashMap<&str, &sync_common::LmsUser> =
            lms_users.iter().map(|u| (u.username.as_str(), u)).collect();

        let idp_users = std::mem::take(&mut self.idp_users);
        let mut delta = UserDelta::default();

        for idp_user in &idp_users {
            let username = idp_user.username.trim().to_lowercase();
            if username.is_empty() {
                delta.to_skip.push(skip_without_match(
                    &idp_user.id,
                    "missing username",
                ));
                continue;
            }

            let email = idp_user
                .email
                .as_deref()
                .unwrap_or_default()
                .trim()
                .to_lowercase();
            if email.is_empty() {
                delta
                    .to_skip
                    .push(skip_without_match(&username, "missing email"));
                continue;
            }

            if !idp_user.enabled {
                delta.to_skip.push(skip_without_match(
                    &username,
                    "disabled at the identity provider",
                ));
                continue;
            }

            if !self.selection.includes_user(&username) {
                delta
                    .to_skip
                    .push(skip_without_match(&username, "not selected"));
                continue;
            }

            // Email is the primary match key; username the fallback
            let matched = by_email
                .get(email.as_str())
                .or_else(|| by_username.get(username.as_str()));

            match matched {
                Some(lms_user) => {
                    let idp_first = idp_user.first_name.clone().unwrap_or_default();
                    let idp_last = idp_user.last_name.clone().unwrap_or_default();

                    let mut patch = LmsUserPatch::default();
                    let mut changed_fields = Vec::new();
                    if lms_user.first_name != idp_first {
                        patch.first_name = Some(idp_first);
                        changed_fields.push("first_name".to_string());
                    }
                    if lms_user.last_name != idp_last {
                        patch.last_name = Some(idp_last);
                        changed_fields.push("last_name".to_string());
                    }

                    if changed_fields.is_empty() {
                        delta.to_skip.push(UserSkip {
                            username,
                            reason: "no changes".to_string(),
                            idp_user: Some(idp_user.clone()),
                            lms_user: Some((*lms_user).clone()),
                        });
                    } else {
                        delta.to_update.push(UserUpdate {
                            idp_user: idp_user.clone(),
                            lms_user: (*lms_user).clone(),
                            patch,
                            changed_fields,
                        });
                    }
                }
                None => delta.to_create.push(UserCreate {
                    idp_user: idp_user.clone(),
                }),
            }
        }

        if self.config.sync_suspend_users {
            let idp_usernames: HashSet<String> = idp_users
                .iter()
                .map(|u| u.username.trim().to_lowercase())
                .collect();

            for lms_user in &lms_users {
                let previously_synced = lms_user.auth_method == self.config.auth_method;
                let gone = !idp_usernames.contains(&lms_user.username);
                let protected = PROTECTED_USERNAMES.contains(&lms_user.username.as_str());
                if previously_synced && gone && !protected && !lms_user.suspended {
                    delta.to_suspend.push(UserSuspend {
                        lms_user: lms_user.clone(),
                    });
                }
            }
        }

        self.stats.users_skipped = delta.to_skip.len() as u64;
        self.publish(
            phase,
            format!(
                "user delta: {} to create, {} to update, {} to suspend, {} skipped",
                delta.to_create.len(),
                delta.to_update.len(),
                delta.to_suspend.len(),
                delta.to_skip.len()
            ),
            idp_users.len() as u64,
            idp_users.len() as u64,
        )
        .await?;

        self.idp_users = idp_users;
        self.user_delta = delta;
        Ok(())
    }

    /// P3: apply the user delta (create, update, suspend, in that order)
    /// and build the run's user cache
    pub(crate) async fn apply_user_changes(&mut self) -> SyncResult<()> {
        let phase = SyncPhase::ApplyUsers;
        let delta = std::mem::take(&mut self.user_delta);
        let total =
            (delta.to_create.len() + delta.to_update.len() + delta.to_suspend.len()) as u64;
        let mut processed = 0u64;

        for item in &delta.to_create {
            let idp_user = &item.idp_user;
            let username = idp_user.username.trim().to_lowercase();
            let new_user = NewLmsUser {
                username: username.clone(),
                email: idp_user
                    .email
                    .as_deref()
                    .unwrap_or_default()
                    .trim()
                    .to_lowercase(),
                auth_method: self.config.auth_method.clone(),
                first_name: idp_user.first_name.clone().unwrap_or_default(),
                last_name: idp_user.last_name.clone().unwrap_or_default(),
            };

            match self.deps.users.create_user(&new_user).await {
                Ok(lms_id) => {
                    self.stats.users_created += 1;
                    self.cache_user(idp_user, lms_id).await?;
                }
                Err(err) => {
                    self.stats.users_errors += 1;
                    self.item_error(phase, &username, &err).await?;
                }
            }

            processed += 1;
            if processed % 25 == 0 {
                self.publish(phase, format!("applied {} user changes", processed), processed, total)
                    .await?;
            }
        }

        for item in &delta.to_update {
            match self
                .deps
                .users
                .update_user(item.lms_user.id, &item.patch)
                .await
            {
                Ok(()) => {
                    self.stats.users_updated += 1;
                    self.cache_user(&item.idp_user, item.lms_user.id).await?;
                }
                Err(err) => {
                    self.stats.users_errors += 1;
                    self.item_error(phase, &item.lms_user.username, &err).await?;
                }
            }
            processed += 1;
        }

        // Unchanged users still enter the cache; later phases resolve
        // memberships against it
        for skip in &delta.to_skip {
            if let (Some(idp_user), Some(lms_user)) = (&skip.idp_user, &skip.lms_user) {
                self.cache_user(idp_user, lms_user.id).await?;
            }
        }

        for item in &delta.to_suspend {
            match self.deps.users.suspend_user(item.lms_user.id).await {
                Ok(()) => self.stats.users_suspended += 1,
                Err(err) => {
                    self.stats.users_errors += 1;
                    self.item_error(phase, &item.lms_user.username, &err).await?;
                }
            }
            processed += 1;
        }

        self.publish(
            phase,
            format!(
                "users applied: {} created, {} updated, {} suspended, {} cached",
                self.stats.users_created,
                self.stats.users_updated,
                self.stats.users_suspended,
                self.user_cache.len()
            ),
            total,
            total,
        )
        .await?;

        self.user_delta = delta;
        Ok(())
    }

    /// Insert a touched user into the run cache; teachers additionally
    /// receive the system-level `coursecreator` role
    async fn cache_user(&mut self, idp_user: &IdpUser, lms_id: i64) -> SyncResult<()> {
        let is_teacher = self.detector.is_teacher(idp_user);
        self.user_cache
            .insert(&idp_user.username, UserCacheEntry { lms_id, is_teacher });

        if is_teacher {
            self.stats.teachers_detected += 1;
            match self.deps.users.assign_course_creator(lms_id).await {
                Ok(true) => self.stats.coursecreators_assigned += 1,
                Ok(false) => {}
                Err(err) => {
                    self.stats.users_errors += 1;
                    self.item_error(SyncPhase::ApplyUsers, &idp_user.username, &err)
                        .await?;
                }
            }
        }
        Ok(())
    }
}

fn skip_without_match(identifier: &str, reason: &str) -> UserSkip {
    UserSkip {
        username: identifier.to_string(),
        reason: reason.to_string(),
        idp_user: None,
        lms_user: None,
    }
}
