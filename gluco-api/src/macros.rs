/// Builder-style setters for optional request parameters.
macro_rules! opt_setter {
    ($($field:ident : $ty:ty),+ $(,)?) => {
        $(
            pub fn $field<T>(mut self, $field: T) -> Self
            where
                T: Into<$ty>,
            {
                self.$field = std::option::Option::Some($field.into());
                self
            }
        )+
    };
}

pub(crate) use opt_setter;
