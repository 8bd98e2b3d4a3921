//! Convenience macros for plugin development.

/// Exports the entry symbol a dynamic plugin library must provide.
///
/// The expression is evaluated each time the host opens the library and
/// must produce a value implementing `PluginModule`.
///
/// # Example
/// ```rust,ignore
/// export_plugin!(AuditModule::default());
/// ```
#[macro_export]
macro_rules! export_plugin {
    ($module:expr) => {
        #[unsafe(no_mangle)]
        pub extern "C" fn ska_plugin_entry() -> *mut ::std::boxed::Box<dyn $crate::__private::PluginModule> {
            let module: ::std::boxed::Box<dyn $crate::__private::PluginModule> =
                ::std::boxed::Box::new($module);
            ::std::boxed::Box::into_raw(::std::boxed::Box::new(module))
        }
    };
}
