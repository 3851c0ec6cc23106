pub mod member_names;
