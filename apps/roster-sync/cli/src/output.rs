use roster_sync_core::{PreviewReport, SyncReport};
use sync_common::SyncJob;

pub fn print_success(msg: &str) {
    println!("OK: {}", msg);
}

pub fn print_error(msg: &str) {
    eprintln!("ERROR: {}", msg);
}

pub fn print_preview(preview: &PreviewReport) {
    println!("Preview (no changes were written):");
    println!(
        "  Users: {} to create, {} to update, {} to suspend, {} skipped",
        preview.users.to_create.len(),
        preview.users.to_update.len(),
        preview.users.to_suspend.len(),
        preview.users.to_skip.len()
    );
    println!(
        "  Courses: {} to create, {} to update, {} unchanged, {} unmatched groups",
        preview.groups.to_create.len(),
        preview.groups.to_update.len(),
        preview.groups.to_skip.len(),
        preview.groups.unmatched.len()
    );

    for unmatched in &preview.groups.unmatched {
        println!(
            "    unmatched: {} ({})",
            unmatched.group.name, unmatched.reason
        );
    }

    if !preview.memberships.is_empty() {
        println!("  Memberships:");
        for membership in &preview.memberships {
            println!(
                "    {} -> {} ({} members)",
                membership.group_name, membership.course_idnumber, membership.member_count
            );
        }
    }

    for warning in &preview.warnings {
        println!("  WARN: {}", warning);
    }
}

pub fn print_report(report: &SyncReport) {
    println!();
    println!("Summary:");
    let stats = &report.stats;
    println!(
        "  Users: {} created, {} updated, {} suspended, {} skipped",
        stats.users_created, stats.users_updated, stats.users_suspended, stats.users_skipped
    );
    println!(
        "  Teachers: {} detected, {} course-creator grants",
        stats.teachers_detected, stats.coursecreators_assigned
    );
    println!(
        "  Courses: {} created, {} updated, {} unchanged, {} unmatched groups",
        stats.courses_created, stats.courses_updated, stats.courses_skipped, stats.groups_unmatched
    );
    println!(
        "  Categories: {} found, {} created",
        stats.categories_found, stats.categories_created
    );
    println!(
        "  Enrolments: {} created, {} role changes, {} removed, {} skipped",
        stats.enrollments_created,
        stats.enrollments_updated,
        stats.enrollments_removed,
        stats.enrollments_skipped
    );

    let errors = stats.total_errors();
    if errors > 0 {
        println!("  Errors: {}", errors);
    }
    if report.cancelled {
        println!("  Run was cancelled; the summary reflects what was applied.");
    }
    for warning in &report.warnings {
        println!("  WARN: {}", warning);
    }
}

pub fn print_job(job: &SyncJob) {
    println!(
        "Job {}: {:?}, {}% (phase: {})",
        job.sync_id,
        job.status,
        job.progress,
        job.phase.map(|p| p.to_string()).unwrap_or_else(|| "-".into())
    );
    if !job.errors.is_empty() {
        println!("Errors:");
        for error in &job.errors {
            println!("  - {}", error);
        }
    }
}

pub fn exit_code_for_report(report: &SyncReport) -> i32 {
    if report.stats.total_errors() > 0 {
        2
    } else {
        0
    }
}
