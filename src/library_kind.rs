/// The name of the pseudo-library which holds JIT-compiled traces.
pub const JIT_LIBRARY_NAME: &str = "<JIT>";
/// The name of the pseudo-library which holds interpreter level functions.
pub const VIRTUAL_LIBRARY_NAME: &str = "<virtual>";
/// The name of the pseudo-library which holds native symbols declared in a profile.
pub const NATIVE_LIBRARY_NAME: &str = "<native>";

/// System libraries whose code counts as external to the profiled runtime.
const EXTERNAL_LIBRARY_PREFIXES: &[&str] = &[
    "libc.",
    "libc-",
    "libm.",
    "libm-",
    "libpthread",
    "ld-linux",
    "ld64.so",
    "libdl.",
    "libdl-",
    "librt.",
    "librt-",
];

/// What kind of code a library holds, as far as it can be told from its name.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub enum LibraryKind {
    Jit,
    Virtual,
    Native,
    Kernel,
    Vdso,
    /// A C runtime library, e.g. `libc.so.6`. Holds the file name.
    System(String),
    /// Any other file. Holds the file name.
    User(String),
}

impl LibraryKind {
    pub fn detect(path: &str) -> Self {
        match path {
            JIT_LIBRARY_NAME => return LibraryKind::Jit,
            VIRTUAL_LIBRARY_NAME => return LibraryKind::Virtual,
            NATIVE_LIBRARY_NAME => return LibraryKind::Native,
            "[vdso]" | "[vdso32]" | "[vdsox32]" | "[vsyscall]" => return LibraryKind::Vdso,
            _ => {}
        }
        if path.starts_with("[kernel") || path.starts_with("[guest.kernel") {
            return LibraryKind::Kernel;
        }

        let filename = match path.rfind('/') {
            Some(final_slash_pos) => &path[final_slash_pos + 1..],
            None => path,
        };
        if EXTERNAL_LIBRARY_PREFIXES
            .iter()
            .any(|prefix| filename.starts_with(prefix))
        {
            LibraryKind::System(filename.to_owned())
        } else {
            LibraryKind::User(filename.to_owned())
        }
    }

    /// Whether code in this library is outside the runtime: kernel, vdso, or
    /// the C runtime.
    pub fn is_external(&self) -> bool {
        matches!(
            self,
            LibraryKind::Kernel | LibraryKind::Vdso | LibraryKind::System(_)
        )
    }
}
