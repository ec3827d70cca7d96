//! Build template shared by every dkrcache build
//!
//! Stage `key` copies the context and bakes in the discriminator, so the
//! builder's layer cache keys everything after it by (context content,
//! discriminator). Stage `fetch` holds the only instruction whose cache
//! state matters: a download from the local listener. The final stage prints
//! whatever that download stored.

/// Stage that fingerprints the inputs
pub const KEY_TARGET: &str = "key";

/// Build argument carrying the caller's discriminator
pub const DISCRIMINATOR_ARG: &str = "discriminator";

/// Build argument carrying the listener port
pub const PORT_ARG: &str = "port";

/// Description the builder records for the fetch layer.
///
/// `$port` is the literal build-arg reference, so the fingerprint does not
/// depend on which port the listener used.
pub const FETCH_FINGERPRINT: &str = "mount / from exec /bin/sh -c wget localhost:$port";

/// Render the Dockerfile for a base image that provides `wget` and `cat`
pub fn dockerfile(base_image: &str) -> String {
    format!(
        r#"FROM {base_image} AS {KEY_TARGET}
WORKDIR /io
COPY context context
ARG {DISCRIMINATOR_ARG}
RUN echo "${DISCRIMINATOR_ARG}" > discriminator

FROM {KEY_TARGET} AS fetch
ARG {PORT_ARG}
RUN wget localhost:${PORT_ARG}

FROM fetch
CMD ["cat", "index.html"]
"#
    )
}

/// Whether a cache record was produced by the fetch instruction
pub fn is_fetch_record(description: &str) -> bool {
    description == FETCH_FINGERPRINT
}
