//! Course phases: group fetch (P4), delta computation (P5), apply (P6)

use super::{MatchedCourse, SyncEngine};
use crate::category::CategoryPathResolver;
use crate::delta::{CourseCreate, CourseSkip, CourseUpdate, GroupDelta, UnmatchedGroup};
use std::collections::HashSet;
use sync_common::{
    JobLogEntry, LmsCoursePatch, NewLmsCourse, SyncPhase, SyncResult,
};

/// Course format stamped on created courses
const COURSE_FORMAT: &str = "topics";

/// Suffix appended when a computed shortname collides with a foreign course
const SHORTNAME_COLLISION_SUFFIX: &str = "_SYNC";

impl SyncEngine {
    /// P4: fetch the flattened group list
    pub(crate) async fn fetch_groups(&mut self) -> SyncResult<()> {
        let phase = SyncPhase::FetchGroups;
        self.publish(phase, "fetching groups", 0, 0).await?;

        self.idp_groups = self.deps.idp.list_groups_flat().await?;

        log::info!("fetched {} groups from identity provider", self.idp_groups.len());
        self.publish(
            phase,
            format!("fetched {} groups", self.idp_groups.len()),
            self.idp_groups.len() as u64,
            self.idp_groups.len() as u64,
        )
        .await
    }

    /// P5: run every group through the schema processor and diff the
    /// resulting course shapes against the LMS
    pub(crate) async fn compute_group_delta(&mut self) -> SyncResult<()> {
        let phase = SyncPhase::ComputeGroupDelta;
        let groups = std::mem::take(&mut self.idp_groups);
        let mut delta = GroupDelta::default();
        let mut matched = Vec::new();
        let mut seen_idnumbers: HashSet<String> = HashSet::new();

        for group in &groups {
            if !self.selection.includes_group(&group.name) {
                delta.to_skip.push(CourseSkip {
                    group_name: group.name.clone(),
                    course_idnumber: String::new(),
                    reason: "not selected".to_string(),
                });
                continue;
            }

            let Some(schema_match) = self.processor.process(&group.name, &group.id) else {
                let kind = crate::classifier::classify(&group.name).kind;
                delta.unmatched.push(UnmatchedGroup {
                    group: group.clone(),
                    reason: format!("no schema matched ({} group)", kind),
                });
                self.stats.groups_unmatched += 1;
                continue;
            };

            // Two groups producing the same idnumber: first wins, the
            // collision is surfaced as an unmatched-group warning
            if !seen_idnumbers.insert(schema_match.course_idnumber.clone()) {
                let warning = format!(
                    "group '{}' collides on idnumber '{}'; first match wins",
                    group.name, schema_match.course_idnumber
                );
                self.progress
                    .log(JobLogEntry::warn(phase, warning.clone()))
                    .await?;
                self.warnings.push(warning);
                delta.unmatched.push(UnmatchedGroup {
                    group: group.clone(),
                    reason: "idnumber collision".to_string(),
                });
                self.stats.groups_unmatched += 1;
                continue;
            }

            match self
                .deps
                .courses
                .find_by_idnumber(&schema_match.course_idnumber)
                .await?
            {
                Some(course) => {
                    if course.fullname != schema_match.course_fullname {
                        delta.to_update.push(CourseUpdate {
                            group: group.clone(),
                            schema_match: schema_match.clone(),
                            patch: LmsCoursePatch {
                                fullname: Some(schema_match.course_fullname.clone()),
                                ..Default::default()
                            },
                            course: course.clone(),
                        });
                    } else {
                        delta.to_skip.push(CourseSkip {
                            group_name: group.name.clone(),
                            course_idnumber: schema_match.course_idnumber.clone(),
                            reason: "no changes".to_string(),
                        });
                        self.stats.courses_skipped += 1;
                    }
                    matched.push(MatchedCourse {
                        group: group.clone(),
                        schema_match,
                        course_id: Some(course.id),
                        members: Vec::new(),
                    });
                }
                None => {
                    delta.to_create.push(CourseCreate {
                        group: group.clone(),
                        schema_match: schema_match.clone(),
                    });
                    matched.push(MatchedCourse {
                        group: group.clone(),
                        schema_match,
                        course_id: None,
                        members: Vec::new(),
                    });
                }
            }
        }

        self.publish(
            phase,
            format!(
                "course delta: {} to create, {} to update, {} unchanged, {} unmatched",
                delta.to_create.len(),
                delta.to_update.len(),
                delta.to_skip.len(),
                delta.unmatched.len()
            ),
            groups.len() as u64,
            groups.len() as u64,
        )
        .await?;

        self.idp_groups = groups;
        self.group_delta = delta;
        self.matched = matched;
        Ok(())
    }

    /// P6: materialize categories and courses
    pub(crate) async fn apply_group_changes(&mut self) -> SyncResult<()> {
        let phase = SyncPhase::ApplyGroups;
        let mut resolver = CategoryPathResolver::load(
            self.deps.categories.clone(),
            self.config.parent_category_id,
            false,
        )
        .await?;

        let delta = std::mem::take(&mut self.group_delta);
        let total = (delta.to_create.len() + delta.to_update.len()) as u64;
        let mut processed = 0u64;

        for item in &delta.to_create {
            match self.materialize_course(&mut resolver, item).await {
                Ok(course_id) => self.set_course_id(&item.group.id, course_id),
                Err(err) => {
                    self.stats.courses_errors += 1;
                    self.item_error(phase, &item.group.name, &err).await?;
                }
            }
            processed += 1;
            self.publish(phase, format!("created course for '{}'", item.group.name), processed, total)
                .await?;
        }

        for item in &delta.to_update {
            match self
                .deps
                .courses
                .update_course(item.course.id, &item.patch)
                .await
            {
                Ok(()) => self.stats.courses_updated += 1,
                Err(err) => {
                    self.stats.courses_errors += 1;
                    self.item_error(phase, &item.group.name, &err).await?;
                }
            }
            processed += 1;
            self.publish(phase, format!("updated course '{}'", item.course.shortname), processed, total)
                .await?;
        }

        let resolver_stats = resolver.stats();
        self.stats.categories_found += resolver_stats.found;
        self.stats.categories_created += resolver_stats.created;
        for path in resolver.created_paths() {
            self.progress
                .log(JobLogEntry::info(phase, format!("created category {}", path)))
                .await?;
        }

        self.group_delta = delta;
        Ok(())
    }

    /// Create one course, claiming an idnumber-less shortname twin when
    /// one exists and suffixing the shortname when a foreign course holds
    /// it
    async fn materialize_course(
        &mut self,
        resolver: &mut CategoryPathResolver,
        item: &CourseCreate,
    ) -> SyncResult<i64> {
        let schema_match = &item.schema_match;
        let category_id = resolver.resolve(&schema_match.category_path).await?;

        if let Some(existing) = self
            .deps
            .courses
            .find_by_shortname(&schema_match.course_shortname)
            .await?
        {
            if existing.idnumber.is_empty() {
                // Claim: adopt the manually created course
                let patch = LmsCoursePatch {
                    idnumber: Some(schema_match.course_idnumber.clone()),
                    category_id: Some(category_id),
                    ..Default::default()
                };
                self.deps.courses.update_course(existing.id, &patch).await?;
                self.stats.courses_updated += 1;
                log::info!(
                    "claimed course '{}' for idnumber {}",
                    existing.shortname,
                    schema_match.course_idnumber
                );
                return Ok(existing.id);
            }
        }

        let mut shortname = schema_match.course_shortname.clone();
        if self
            .deps
            .courses
            .find_by_shortname(&shortname)
            .await?
            .is_some()
        {
            shortname.push_str(SHORTNAME_COLLISION_SUFFIX);
        }

        let course_id = self
            .deps
            .courses
            .create_course(&NewLmsCourse {
                idnumber: schema_match.course_idnumber.clone(),
                shortname,
                fullname: schema_match.course_fullname.clone(),
                category_id,
                format: COURSE_FORMAT.to_string(),
                visible: true,
            })
            .await?;

        self.stats.courses_created += 1;
        Ok(course_id)
    }

    fn set_course_id(&mut self, group_id: &str, course_id: i64) {
        if let Some(entry) = self.matched.iter_mut().find(|m| m.group.id == group_id) {
            entry.course_id = Some(course_id);
        }
    }
}
