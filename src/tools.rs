/// Tool selection after a submission finishes, successfully or not.
///
/// Tools are single-use: the selection resets to none after one turn,
/// except for the one `persistent` tool, which stays selected.
pub fn next_tool(prior: Option<&str>, persistent: Option<&str>) -> Option<String> {
    match (prior, persistent) {
        (Some(tool), Some(keep)) if tool == keep => Some(tool.to_string()),
        _ => None,
    }
}
