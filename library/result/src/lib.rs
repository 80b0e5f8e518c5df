use error::GenetError;

/// A Result is an alias of [std::result::Result](std::result::Result) with its error variant
/// pre-populated with a `Box<dyn GenetError>`. This allows for shorter
/// notation throughout the codebase.
///
/// For example, instead of writing...
///
/// ```
/// use error::GenetError;
///
/// fn greet() -> Result<&'static str, Box<dyn GenetError>> {
///     Ok("Hello, genet!")
/// }
/// ```
///
/// ...you can simply say...
///
/// ```
/// use error::GenetError;
/// use result::Result;
///
/// fn greet() -> Result<&'static str> {
///     Ok("Hello, genet!")
/// }
/// ```
///
/// It also helps in easily identifying if any functions are returning errors
/// BEFORE converting them into project native [GenetError](error::GenetError)s.
pub type Result<T> = std::result::Result<T, Box<dyn GenetError>>;
