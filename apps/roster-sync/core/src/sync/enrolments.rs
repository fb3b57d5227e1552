//! Enrolment phases: membership fetch (P7), delta computation (P8),
//! apply (P9)

use super::SyncEngine;
use crate::delta::{EnrolCreate, EnrolDelta, EnrolSkip, RoleChange, Unenrol};
use std::collections::HashMap;
use sync_common::{EnrolRole, SyncPhase, SyncResult};

impl SyncEngine {
    /// P7: drain members for every schema-matched group with a
    /// materialized course. Unmatched groups are never fetched.
    pub(crate) async fn fetch_memberships(&mut self) -> SyncResult<()> {
        let phase = SyncPhase::FetchMemberships;
        let page_size = self.config.page_size;
        let mut matched = std::mem::take(&mut self.matched);

        let total = matched.iter().filter(|m| m.course_id.is_some()).count() as u64;
        let mut processed = 0u64;

        for entry in matched.iter_mut() {
            if entry.course_id.is_none() {
                continue;
            }

            let mut members = Vec::new();
            let mut first = 0;
            let mut failed = false;
            loop {
                match self
                    .deps
                    .idp
                    .list_group_members(&entry.group.id, first, page_size)
                    .await
                {
                    Ok(page) => {
                        let fetched = page.len();
                        first += fetched;
                        members.extend(page);
                        if fetched < page_size {
                            break;
                        }
                    }
                    // A failed member fetch skips this group's
                    // enrolments, not the phase
                    Err(err) => {
                        self.stats.enrollments_errors += 1;
                        self.item_error(phase, &entry.group.name, &err).await?;
                        failed = true;
                        break;
                    }
                }
            }

            processed += 1;
            let message = if failed {
                format!("member fetch failed for '{}'", entry.group.name)
            } else {
                entry.members = members;
                format!(
                    "fetched {} members of '{}'",
                    entry.members.len(),
                    entry.group.name
                )
            };
            self.publish(phase, message, processed, total).await?;
        }

        self.matched = matched;
        Ok(())
    }

    /// P8: compare memberships against existing manual enrolments
    pub(crate) async fn compute_enrolment_delta(&mut self) -> SyncResult<()> {
        let phase = SyncPhase::ComputeEnrolmentDelta;
        let matched = std::mem::take(&mut self.matched);
        let mut delta = EnrolDelta::default();

        // Preload current manual enrolments with their assigned role
        let mut current: HashMap<(i64, i64), EnrolRole> = HashMap::new();
        for entry in &matched {
            if let Some(course_id) = entry.course_id {
                for enrolment in self.deps.enrolments.list_manual_enrolments(course_id).await? {
                    current.insert((enrolment.course_id, enrolment.user_id), enrolment.role);
                }
            }
        }

        for entry in &matched {
            let Some(course_id) = entry.course_id else {
                continue;
            };
            let idnumber = &entry.schema_match.course_idnumber;

            for member in &entry.members {
                let username = member.username.trim().to_lowercase();
                let Some(cached) = self.user_cache.get(&username) else {
                    delta.to_skip.push(EnrolSkip {
                        username,
                        course_idnumber: idnumber.clone(),
                        reason: "user not found".to_string(),
                    });
                    self.stats.enrollments_skipped += 1;
                    continue;
                };

                let role = entry.schema_match.role_map.role_for(cached.is_teacher);

                // Recorded before any gating so the unenrol scan never
                // removes a member the options merely declined to enrol
                if !self.expected_enrolments.insert((course_id, cached.lms_id)) {
                    delta.to_skip.push(EnrolSkip {
                        username,
                        course_idnumber: idnumber.clone(),
                        reason: "duplicate membership".to_string(),
                    });
                    self.stats.enrollments_skipped += 1;
                    continue;
                }

                if cached.is_teacher && !self.config.auto_enroll_teachers {
                    delta.to_skip.push(EnrolSkip {
                        username,
                        course_idnumber: idnumber.clone(),
                        reason: "teacher enrolment disabled".to_string(),
                    });
                    self.stats.enrollments_skipped += 1;
                    continue;
                }
                if !cached.is_teacher && !self.config.auto_enroll_students {
                    delta.to_skip.push(EnrolSkip {
                        username,
                        course_idnumber: idnumber.clone(),
                        reason: "student enrolment disabled".to_string(),
                    });
                    self.stats.enrollments_skipped += 1;
                    continue;
                }

                match current.get(&(course_id, cached.lms_id)) {
                    Some(current_role) if *current_role == role => {
                        delta.to_skip.push(EnrolSkip {
                            username,
                            course_idnumber: idnumber.clone(),
                            reason: "already enrolled with target role".to_string(),
                        });
                        self.stats.enrollments_skipped += 1;
                    }
                    Some(current_role) => delta.to_update_role.push(RoleChange {
                        course_id,
                        course_idnumber: idnumber.clone(),
                        user_id: cached.lms_id,
                        username,
                        old_role: *current_role,
                        new_role: role,
                    }),
                    None => delta.to_enroll.push(EnrolCreate {
                        course_id,
                        course_idnumber: idnumber.clone(),
                        user_id: cached.lms_id,
                        username,
                        role,
                    }),
                }
            }
        }

        // Enrolments on sync-owned courses with no backing membership.
        // Courses without a known sync prefix are never touched.
        if self.config.sync_unenroll_users {
            let prefixes = self.config.sync_prefixes();
            for course in self.deps.courses.list_courses_with_prefix(&prefixes).await? {
                for enrolment in self.deps.enrolments.list_manual_enrolments(course.id).await? {
                    if !self
                        .expected_enrolments
                        .contains(&(enrolment.course_id, enrolment.user_id))
                    {
                        delta.to_unenroll.push(Unenrol {
                            course_id: enrolment.course_id,
                            course_idnumber: course.idnumber.clone(),
                            user_id: enrolment.user_id,
                        });
                    }
                }
            }
        }

        self.publish(
            phase,
            format!(
                "enrolment delta: {} to enrol, {} role changes, {} to unenrol, {} skipped",
                delta.to_enroll.len(),
                delta.to_update_role.len(),
                delta.to_unenroll.len(),
                delta.to_skip.len()
            ),
            matched.len() as u64,
            matched.len() as u64,
        )
        .await?;

        self.matched = matched;
        self.enrol_delta = delta;
        Ok(())
    }

    /// P9: apply the enrolment delta
    pub(crate) async fn apply_enrolments(&mut self) -> SyncResult<()> {
        let phase = SyncPhase::ApplyEnrolments;
        let delta = std::mem::take(&mut self.enrol_delta);
        let total =
            (delta.to_enroll.len() + delta.to_update_role.len() + delta.to_unenroll.len()) as u64;
        let mut processed = 0u64;

        for item in &delta.to_enroll {
            let outcome = match self
                .deps
                .enrolments
                .ensure_manual_instance(item.course_id)
                .await
            {
                Ok(_) => {
                    self.deps
                        .enrolments
                        .enrol(item.course_id, item.user_id, item.role)
                        .await
                }
                Err(err) => Err(err),
            };

            match outcome {
                Ok(()) => self.stats.enrollments_created += 1,
                Err(err) => {
                    self.stats.enrollments_errors += 1;
                    self.item_error(phase, &item.username, &err).await?;
                }
            }
            processed += 1;
            if processed % 25 == 0 {
                self.publish(phase, format!("applied {} enrolments", processed), processed, total)
                    .await?;
            }
        }

        for item in &delta.to_update_role {
            // The enrolment row is preserved; only the role assignment
            // swaps
            match self
                .deps
                .enrolments
                .change_role(item.course_id, item.user_id, item.old_role, item.new_role)
                .await
            {
                Ok(()) => self.stats.enrollments_updated += 1,
                Err(err) => {
                    self.stats.enrollments_errors += 1;
                    self.item_error(phase, &item.username, &err).await?;
                }
            }
            processed += 1;
        }

        for item in &delta.to_unenroll {
            match self
                .deps
                .enrolments
                .unenrol(item.course_id, item.user_id)
                .await
            {
                Ok(()) => self.stats.enrollments_removed += 1,
                Err(err) => {
                    self.stats.enrollments_errors += 1;
                    self.item_error(phase, &item.course_idnumber, &err).await?;
                }
            }
            processed += 1;
        }

        self.publish(
            phase,
            format!(
                "enrolments applied: {} created, {} role changes, {} removed",
                self.stats.enrollments_created,
                self.stats.enrollments_updated,
                self.stats.enrollments_removed
            ),
            total,
            total,
        )
        .await?;

        self.enrol_delta = delta;
        Ok(())
    }
}
