//! Shell snippets embedded into generated containers.

/// `$0` placeholder passed to `sh -c` so `"$@"` is exactly the original command.
pub const KEEPALIVE_ARG0: &str = "agentrun-keepalive";

/// Runs `"$@"`, keeps the container around for `KEEP_ALIVE_SECONDS`, then exits with the agent's code.
pub const KEEPALIVE: &str = r#""$@"
code=$?
echo "agentrun: agent exited with code ${code}; keeping container alive for ${KEEP_ALIVE_SECONDS}s"
sleep "${KEEP_ALIVE_SECONDS}"
exit "${code}""#;

/// Mount point of a repository volume inside its clone container.
pub const CLONE_ROOT: &str = "/git";

/// Directory of the clone inside the repository volume.
pub const CLONE_DIR: &str = "repo";

/// One-shot shallow clone of `$GIT_REPO` into `/git/repo`.
pub fn clone(with_branch: bool, with_credentials: bool) -> String {
    let mut git = String::from("git");
    if with_credentials {
        git.push_str(
            r#" -c credential.helper='!f() { echo "username=${GIT_USERNAME}"; echo "password=${GIT_PASSWORD}"; }; f'"#,
        );
    }
    git.push_str(r#" clone --depth "${GIT_DEPTH}""#);
    if with_branch {
        git.push_str(r#" --branch "${GIT_REF}""#);
    }
    git.push_str(&format!(r#" "${{GIT_REPO}}" {CLONE_ROOT}/{CLONE_DIR}"#));
    format!("set -e\n{git}")
}
