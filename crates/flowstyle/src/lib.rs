#![doc = env!("CARGO_PKG_DESCRIPTION")]

#[doc(inline)]
pub use flowstyle_image as image;

#[doc(inline)]
pub use flowstyle_imgproc as imgproc;

#[doc(inline)]
pub use flowstyle_flow as flow;

#[doc(inline)]
pub use flowstyle_io as io;

#[doc(inline)]
pub use flowstyle_stylize as stylize;
