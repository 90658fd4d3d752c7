//! Test-generation agent: a test artifact for the plan, written before the
//! code it will exercise.

pub fn prompt(task: &str, plan: &str) -> String {
    format!(
        "Write tests for the following task before the implementation exists.\n\n\
         TASK: {}\n\nPLAN:\n{}\n\n\
         Cover the normal path and the edge cases the plan implies. \
         Return only the test code.",
        task, plan
    )
}
